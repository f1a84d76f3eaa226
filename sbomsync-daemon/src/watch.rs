//! Event-driven front-end.
//!
//! [`WatchDriver`] folds the cluster watch stream through a [`PodInformer`] and
//! hands every pod event to the reconciler on its own task.
//!
//! # Ordering
//!
//! Handlers for the same pod run one after another in arrival order: each new
//! handler awaits the previous handler of that pod before it starts. Handlers
//! for different pods run concurrently.
//!
//! # Shutdown
//!
//! When the token is cancelled the driver stops reading the stream and waits
//! up to `shutdown_timeout` for in-flight handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use sbomsync_cluster::{ClusterClient, PodCache, PodEvent, PodInformer};
use sbomsync_core::marker::PodMarker;
use sbomsync_core::scan::ImageScanner;
use sbomsync_core::types::PodKey;
use sbomsync_reconciler::Reconciler;

/// What happened during one watch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    /// Pod events dispatched (including the synced signal)
    pub events: usize,
    /// Handlers were still running when the drain deadline passed
    pub timed_out: bool,
}

/// Watch-mode driver.
pub struct WatchDriver<C, S, M>
where
    C: ClusterClient,
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    client: Arc<C>,
    reconciler: Arc<Reconciler<S, M>>,
    pod_selector: Option<String>,
    shutdown_timeout: Duration,
}

impl<C, S, M> WatchDriver<C, S, M>
where
    C: ClusterClient,
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    pub fn new(
        client: Arc<C>,
        reconciler: Arc<Reconciler<S, M>>,
        pod_selector: Option<String>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            client,
            reconciler,
            pod_selector,
            shutdown_timeout,
        }
    }

    /// Initializes targets once, then processes pod events until `cancel`
    /// fires or the stream ends.
    ///
    /// The first full reconciliation pass runs when the informer reports
    /// the initial list as synced.
    pub async fn run(self, cancel: CancellationToken) -> WatchSummary {
        let available = self.reconciler.initialize_targets().await;
        if available == 0 {
            warn!("no catalog target available, pods will be watched but not scanned");
        }

        let mut informer = PodInformer::new();
        let cache = informer.cache();
        let mut stream = self.client.watch_pods(self.pod_selector.as_deref());
        let tracker = TaskTracker::new();
        let mut tails: HashMap<PodKey, JoinHandle<()>> = HashMap::new();
        let mut summary = WatchSummary::default();

        info!(selector = ?self.pod_selector, "watching pods");
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("shutdown requested, no longer reading pod events");
                    break;
                }
                next = stream.next() => next,
            };

            let raw = match next {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    warn!(error = %e, "pod watch error, stream will retry");
                    continue;
                }
                None => {
                    warn!("pod watch stream ended");
                    break;
                }
            };

            for event in informer.apply(raw) {
                summary.events += 1;
                self.dispatch(event, &cache, &tracker, &mut tails);
            }
            tails.retain(|_, handle| !handle.is_finished());
        }

        tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = tracker.len(),
                timeout_secs = self.shutdown_timeout.as_secs(),
                "handlers still running at shutdown deadline"
            );
            summary.timed_out = true;
        }
        summary
    }

    fn dispatch(
        &self,
        event: PodEvent,
        cache: &PodCache,
        tracker: &TaskTracker,
        tails: &mut HashMap<PodKey, JoinHandle<()>>,
    ) {
        let reconciler = Arc::clone(&self.reconciler);
        let cache = cache.clone();

        let Some(key) = event.pod_key() else {
            info!(pods = cache.len(), "pod cache synced, starting initial reconciliation pass");
            tracker.spawn(async move {
                let pods = cache.snapshot();
                reconciler.full_pass(&pods).await;
            });
            return;
        };

        let previous = tails.remove(&key);
        let handle = tracker.spawn(async move {
            if let Some(previous) = previous {
                // ordering only
                let _ = previous.await;
            }
            handle_event(&reconciler, &cache, event).await;
        });
        tails.insert(key, handle);
    }
}

async fn handle_event<S, M>(reconciler: &Reconciler<S, M>, cache: &PodCache, event: PodEvent)
where
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    match event {
        PodEvent::Added(pod) => {
            let outcome = reconciler.handle_added(&pod).await;
            debug!(pod = %pod.key(), uploaded = outcome.uploaded, failed = outcome.failed, "added pod handled");
        }
        PodEvent::Updated { old, new } => {
            let pods = cache.snapshot();
            let outcome = reconciler.handle_updated(&old, &new, &pods).await;
            debug!(pod = %new.key(), uploaded = outcome.uploaded, failed = outcome.failed, "updated pod handled");
        }
        PodEvent::Deleted(pod) => {
            let pods = cache.snapshot();
            let removed = reconciler.handle_deleted(&pod, &pods).await;
            debug!(pod = %pod.key(), removed, "deleted pod handled");
        }
        PodEvent::Synced => {}
    }
}
