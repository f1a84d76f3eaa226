//! Kubernetes API abstraction for testability.
//!
//! The [`ClusterClient`] trait covers the three cluster operations the
//! reconciler needs (list namespaces, list pods, watch pods). Production code
//! uses [`KubeClusterClient`]; tests use `MockClusterClient`.
//!
//! # Architecture
//!
//! ```text
//!   ┌──────────────┐      ┌────────────┐
//!   │ Watch driver │      │Cron driver │
//!   └──────┬───────┘      └─────┬──────┘
//!          │ watch_pods         │ list_namespaces / list_pods
//!          ▼                    ▼
//!        ┌──────────────────────────┐
//!        │  ClusterClient (trait)   │──── PodMarker (annotations)
//!        └──────────────────────────┘
//!             │              │
//!             ▼              ▼
//!      KubeClusterClient   Mock
//!             │
//!             ▼
//!      kube-apiserver
//! ```

use std::future::Future;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::{WatchStreamExt, watcher};
use tracing::{debug, warn};

use sbomsync_core::error::ClusterError;
use sbomsync_core::marker::PodMarker;
use sbomsync_core::types::PodSnapshot;

use crate::convert::{is_marked_processed, pod_snapshot, processed_annotations};
use crate::informer::WatchEvent;

/// Trait abstracting the Kubernetes API operations.
///
/// Selectors are standard label selectors. `None` selects everything.
pub trait ClusterClient: Send + Sync + 'static {
    /// Lists namespace names matching the selector.
    fn list_namespaces(
        &self,
        selector: Option<&str>,
    ) -> impl Future<Output = Result<Vec<String>, ClusterError>> + Send;

    /// Lists pods, optionally restricted to one namespace.
    fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> impl Future<Output = Result<Vec<PodSnapshot>, ClusterError>> + Send;

    /// Watches pods in all namespaces.
    ///
    /// The stream starts with an `Init`/`InitApply*`/`InitDone` sequence and
    /// repeats it after a desync. Errors are yielded and the stream keeps
    /// retrying with backoff.
    fn watch_pods(&self, selector: Option<&str>)
    -> BoxStream<'static, Result<WatchEvent, ClusterError>>;
}

/// Turns an empty selector string into `None`.
pub fn selector(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Lists the pods a full reconciliation pass should see.
///
/// With a namespace selector, only pods in matching namespaces are returned.
/// A failure in any namespace fails the whole listing: a partial listing
/// would make live images look orphaned.
pub async fn list_selected_pods<C: ClusterClient>(
    client: &C,
    namespace_selector: Option<&str>,
    pod_selector: Option<&str>,
) -> Result<Vec<PodSnapshot>, ClusterError> {
    let Some(namespace_selector) = namespace_selector else {
        return client.list_pods(None, pod_selector).await;
    };

    let namespaces = client.list_namespaces(Some(namespace_selector)).await?;
    debug!(count = namespaces.len(), "namespaces selected");

    let mut pods = Vec::new();
    for namespace in &namespaces {
        pods.extend(client.list_pods(Some(namespace), pod_selector).await?);
    }
    Ok(pods)
}

/// Settings for [`KubeClusterClient`].
#[derive(Debug, Clone)]
pub struct KubeClientConfig {
    /// Prefix for processed-pod annotation keys
    pub annotation_prefix: String,
    /// Skip writing processed-pod annotations
    pub ignore_annotations: bool,
    /// Timeout for list and patch requests
    pub request_timeout: Duration,
}

impl KubeClientConfig {
    /// Builds the client settings from the core config section.
    pub fn from_core(core: &sbomsync_core::config::ClusterConfig) -> Self {
        Self {
            annotation_prefix: core.annotation_prefix.clone(),
            ignore_annotations: core.ignore_annotations,
            request_timeout: Duration::from_secs(core.request_timeout_secs),
        }
    }
}

impl Default for KubeClientConfig {
    fn default() -> Self {
        Self::from_core(&sbomsync_core::config::ClusterConfig::default())
    }
}

/// Production implementation backed by `kube`.
pub struct KubeClusterClient {
    client: kube::Client,
    config: KubeClientConfig,
}

impl KubeClusterClient {
    /// Connects using in-cluster config or the local kubeconfig.
    ///
    /// # Errors
    ///
    /// Returns `ClusterError::Connection` if no usable configuration is found.
    pub async fn connect(config: KubeClientConfig) -> Result<Self, ClusterError> {
        let client = kube::Client::try_default()
            .await
            .map_err(|e| ClusterError::Connection(format!("failed to create kube client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Wraps an existing client.
    pub fn with_client(client: kube::Client, config: KubeClientConfig) -> Self {
        Self { client, config }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, ClusterError> {
        tokio::time::timeout(self.config.request_timeout, fut)
            .await
            .map_err(|_| ClusterError::Api {
                operation: operation.to_owned(),
                reason: format!("timed out after {:?}", self.config.request_timeout),
            })?
            .map_err(|e| ClusterError::Api {
                operation: operation.to_owned(),
                reason: e.to_string(),
            })
    }
}

fn list_params(selector: Option<&str>) -> ListParams {
    match selector {
        Some(sel) => ListParams::default().labels(sel),
        None => ListParams::default(),
    }
}

impl ClusterClient for KubeClusterClient {
    async fn list_namespaces(&self, selector: Option<&str>) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let lp = list_params(selector);
        let list = self.bounded("list namespaces", api.list(&lp)).await?;
        Ok(list
            .items
            .into_iter()
            .filter_map(|ns| ns.metadata.name)
            .collect())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: Option<&str>,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let lp = list_params(selector);
        let list = self.bounded("list pods", api.list(&lp)).await?;
        Ok(list.items.iter().filter_map(pod_snapshot).collect())
    }

    fn watch_pods(
        &self,
        selector: Option<&str>,
    ) -> BoxStream<'static, Result<WatchEvent, ClusterError>> {
        let api: Api<Pod> = Api::all(self.client.clone());
        let config = match selector {
            Some(sel) => watcher::Config::default().labels(sel),
            None => watcher::Config::default(),
        };
        watcher(api, config)
            .default_backoff()
            .filter_map(|event| futures::future::ready(convert_watch_event(event)))
            .boxed()
    }
}

fn convert_watch_event(
    event: Result<watcher::Event<Pod>, watcher::Error>,
) -> Option<Result<WatchEvent, ClusterError>> {
    let event = match event {
        Ok(event) => event,
        Err(e) => return Some(Err(ClusterError::Watch(e.to_string()))),
    };
    let converted = match event {
        watcher::Event::Init => WatchEvent::Init,
        watcher::Event::InitDone => WatchEvent::InitDone,
        watcher::Event::InitApply(pod) => WatchEvent::InitApply(pod_snapshot(&pod)?),
        watcher::Event::Apply(pod) => WatchEvent::Apply(pod_snapshot(&pod)?),
        watcher::Event::Delete(pod) => WatchEvent::Delete(pod_snapshot(&pod)?),
    };
    Some(Ok(converted))
}

impl PodMarker for KubeClusterClient {
    async fn mark_processed(&self, pod: &PodSnapshot) -> Result<(), ClusterError> {
        if self.config.ignore_annotations || pod.containers.is_empty() {
            return Ok(());
        }
        if is_marked_processed(&self.config.annotation_prefix, pod) {
            debug!(pod = %pod.key(), "pod already marked as processed");
            return Ok(());
        }

        let annotations = processed_annotations(&self.config.annotation_prefix, pod);
        let patch = serde_json::json!({ "metadata": { "annotations": annotations } });
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &pod.pod_namespace);
        let params = PatchParams::default();

        match self
            .bounded(
                "annotate pod",
                api.patch(&pod.pod_name, &params, &Patch::Merge(&patch)),
            )
            .await
        {
            Ok(_) => {
                debug!(pod = %pod.key(), "pod marked as processed");
                Ok(())
            }
            Err(e) => {
                warn!(pod = %pod.key(), error = %e, "failed to annotate pod");
                Err(e)
            }
        }
    }
}

/// Mock cluster client for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MockClusterClient {
    /// Namespaces returned by `list_namespaces`
    pub namespaces: Vec<String>,
    /// Pods returned by `list_pods`
    pub pods: Vec<PodSnapshot>,
    /// Namespaces whose pod listing fails
    pub failing_namespaces: Vec<String>,
    /// Events replayed by `watch_pods`
    pub events: Vec<WatchEvent>,
    /// Pods passed to `mark_processed`
    pub marked: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MockClusterClient {
    /// Creates an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespaces.
    pub fn with_namespaces(mut self, namespaces: &[&str]) -> Self {
        self.namespaces = namespaces.iter().map(|s| (*s).to_owned()).collect();
        self
    }

    /// Sets the pods.
    pub fn with_pods(mut self, pods: Vec<PodSnapshot>) -> Self {
        self.pods = pods;
        self
    }

    /// Makes pod listing fail for a namespace.
    pub fn with_failing_namespace(mut self, namespace: &str) -> Self {
        self.failing_namespaces.push(namespace.to_owned());
        self
    }

    /// Sets the watch events.
    pub fn with_events(mut self, events: Vec<WatchEvent>) -> Self {
        self.events = events;
        self
    }
}

#[cfg(test)]
impl ClusterClient for MockClusterClient {
    async fn list_namespaces(&self, _selector: Option<&str>) -> Result<Vec<String>, ClusterError> {
        Ok(self.namespaces.clone())
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        _selector: Option<&str>,
    ) -> Result<Vec<PodSnapshot>, ClusterError> {
        if let Some(ns) = namespace
            && self.failing_namespaces.iter().any(|f| f == ns)
        {
            return Err(ClusterError::Api {
                operation: "list pods".to_owned(),
                reason: "mock failure".to_owned(),
            });
        }
        Ok(self
            .pods
            .iter()
            .filter(|p| namespace.is_none_or(|ns| p.pod_namespace == ns))
            .cloned()
            .collect())
    }

    fn watch_pods(
        &self,
        _selector: Option<&str>,
    ) -> BoxStream<'static, Result<WatchEvent, ClusterError>> {
        futures::stream::iter(self.events.clone().into_iter().map(Ok)).boxed()
    }
}

#[cfg(test)]
impl PodMarker for MockClusterClient {
    async fn mark_processed(&self, pod: &PodSnapshot) -> Result<(), ClusterError> {
        self.marked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pod.key().to_string());
        Ok(())
    }
}
