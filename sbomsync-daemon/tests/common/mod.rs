//! In-memory collaborators shared by the daemon integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use sbomsync_cluster::{ClusterClient, WatchEvent};
use sbomsync_core::error::{CatalogError, ClusterError, ScanError};
use sbomsync_core::marker::PodMarker;
use sbomsync_core::scan::ImageScanner;
use sbomsync_core::target::CatalogTarget;
use sbomsync_core::types::{
    ImageIdentity, Inventory, PodSnapshot, RemovalReport, ScanResult, TargetInventoryEntry,
};
use sbomsync_reconciler::{Reconciler, ReconcilerBuilder};

pub fn pod(ns: &str, name: &str, containers: &[(&str, &str)]) -> PodSnapshot {
    PodSnapshot::new(ns, name, BTreeMap::new(), containers.iter().copied())
}

/// Polls `condition` every 10ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// --- Cluster ---

pub type WatchSender = mpsc::UnboundedSender<Result<WatchEvent, ClusterError>>;

#[derive(Default)]
pub struct FakeCluster {
    pub namespaces: Mutex<Vec<String>>,
    pub pods: Mutex<Vec<PodSnapshot>>,
    pub fail_listing: Mutex<bool>,
    pub list_delay: Option<Duration>,
    pub marked: Mutex<Vec<String>>,
    watch: Mutex<Option<mpsc::UnboundedReceiver<Result<WatchEvent, ClusterError>>>>,
}

impl FakeCluster {
    pub fn with_pods(self, pods: Vec<PodSnapshot>) -> Self {
        *self.pods.lock().unwrap() = pods;
        self
    }

    pub fn with_namespaces(self, namespaces: &[&str]) -> Self {
        *self.namespaces.lock().unwrap() = namespaces.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Connects a channel to the next `watch_pods` call.
    pub fn watch_channel(&self) -> WatchSender {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.watch.lock().unwrap() = Some(rx);
        tx
    }

    pub fn marked(&self) -> Vec<String> {
        self.marked.lock().unwrap().clone()
    }
}

impl ClusterClient for FakeCluster {
    async fn list_namespaces(&self, _selector: Option<&str>) -> Result<Vec<String>, ClusterError> {
        Ok(self.namespaces.lock().unwrap().clone())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        _selector: Option<&str>,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_listing.lock().unwrap() {
            return Err(ClusterError::Api {
                operation: "list pods".to_owned(),
                reason: "connection refused".to_owned(),
            });
        }
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|p| namespace.is_none_or(|ns| p.pod_namespace == ns))
            .cloned()
            .collect())
    }

    fn watch_pods(&self, _selector: Option<&str>) -> BoxStream<'static, Result<WatchEvent, ClusterError>> {
        match self.watch.lock().unwrap().take() {
            Some(rx) => futures::stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|event| (event, rx))
            })
            .boxed(),
            None => futures::stream::pending::<Result<WatchEvent, ClusterError>>().boxed(),
        }
    }
}

impl PodMarker for FakeCluster {
    async fn mark_processed(&self, pod: &PodSnapshot) -> Result<(), ClusterError> {
        self.marked.lock().unwrap().push(pod.key().to_string());
        Ok(())
    }
}

// --- Scanner ---

#[derive(Default)]
pub struct FakeScanner {
    pub delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl FakeScanner {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ImageScanner for FakeScanner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn scan(&self, image_reference: &str) -> Result<String, ScanError> {
        self.calls.lock().unwrap().push(image_reference.to_owned());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(format!(r#"{{"bomFormat":"CycloneDX","image":"{image_reference}"}}"#))
    }
}

// --- Catalog ---

#[derive(Default)]
pub struct FakeCatalog {
    assets: Mutex<BTreeMap<String, BTreeSet<String>>>,
    log: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn with_asset(self, namespace: &str, repository: &str) -> Self {
        self.assets
            .lock()
            .unwrap()
            .entry(namespace.to_owned())
            .or_default()
            .insert(repository.to_owned());
        self
    }

    pub fn has_asset(&self, namespace: &str, repository: &str) -> bool {
        self.assets
            .lock()
            .unwrap()
            .get(namespace)
            .is_some_and(|repos| repos.contains(repository))
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CatalogTarget for FakeCatalog {
    fn name(&self) -> &str {
        "fake-catalog"
    }

    async fn initialize(&self) -> Result<(), CatalogError> {
        Ok(())
    }

    async fn load_inventory(&self) -> Result<Inventory, CatalogError> {
        let mut inventory = Inventory::default();
        for (namespace, repos) in self.assets.lock().unwrap().iter() {
            for repo in repos {
                inventory.insert(TargetInventoryEntry::from_identity(ImageIdentity::new(
                    namespace.as_str(),
                    repo.as_str(),
                )));
            }
        }
        Ok(inventory)
    }

    async fn upload(&self, result: &ScanResult) -> Result<(), CatalogError> {
        self.assets
            .lock()
            .unwrap()
            .entry(result.pod_namespace.clone())
            .or_default()
            .insert(result.identity.repository.clone());
        self.log
            .lock()
            .unwrap()
            .push(format!("upload {}:{}", result.identity, result.version()));
        Ok(())
    }

    async fn remove(&self, entries: &[TargetInventoryEntry]) -> Result<RemovalReport, CatalogError> {
        let mut assets = self.assets.lock().unwrap();
        let mut report = RemovalReport::default();
        for entry in entries {
            if let Some(repos) = assets.get_mut(&entry.namespace) {
                repos.remove(&entry.identity.repository);
            }
            self.log.lock().unwrap().push(format!("remove {}", entry.identity));
            report.removed += 1;
        }
        assets.retain(|_, repos| !repos.is_empty());
        Ok(report)
    }
}

pub struct Fixture {
    pub cluster: Arc<FakeCluster>,
    pub scanner: Arc<FakeScanner>,
    pub catalog: Arc<FakeCatalog>,
    pub reconciler: Arc<Reconciler<FakeScanner, FakeCluster>>,
}

pub fn fixture(cluster: FakeCluster, scanner: FakeScanner, catalog: FakeCatalog) -> Fixture {
    let cluster = Arc::new(cluster);
    let scanner = Arc::new(scanner);
    let catalog = Arc::new(catalog);
    let reconciler = ReconcilerBuilder::new()
        .scanner(Arc::clone(&scanner))
        .marker(Arc::clone(&cluster))
        .add_target(catalog.clone())
        .build()
        .unwrap();
    Fixture {
        cluster,
        scanner,
        catalog,
        reconciler: Arc::new(reconciler),
    }
}
