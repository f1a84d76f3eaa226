//! Periodic (cron) front-end.
//!
//! [`CronDriver`] runs a full reconciliation pass on every tick of a six-field
//! cron schedule (`sec min hour day month weekday`). A tick that arrives while
//! the previous pass is still running is skipped, never queued.
//!
//! Each pass re-initializes the targets, lists namespaces and pods through the
//! configured selectors, and hands the listing to [`Reconciler::full_pass`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use cron::Schedule;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use sbomsync_cluster::{ClusterClient, list_selected_pods};
use sbomsync_core::marker::PodMarker;
use sbomsync_core::metrics as m;
use sbomsync_core::scan::ImageScanner;
use sbomsync_reconciler::{PassReport, Reconciler};

/// Parses a six-field cron expression.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    Schedule::from_str(expr)
        .map_err(|e| anyhow::anyhow!("invalid cron expression '{}': {}", expr, e))
}

/// Lets at most one pass run at a time.
#[derive(Debug, Clone)]
pub struct SingleFlight {
    slot: Arc<Semaphore>,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
        }
    }
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the slot if it is free. The slot is released when the permit
    /// is dropped.
    pub fn try_begin(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slot).try_acquire_owned().ok()
    }

    /// Whether a pass currently holds the slot.
    pub fn is_running(&self) -> bool {
        self.slot.available_permits() == 0
    }
}

/// Cron-mode driver.
pub struct CronDriver<C, S, M>
where
    C: ClusterClient,
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    client: Arc<C>,
    reconciler: Arc<Reconciler<S, M>>,
    schedule: Schedule,
    namespace_selector: Option<String>,
    pod_selector: Option<String>,
    guard: SingleFlight,
    shutdown_timeout: Duration,
}

impl<C, S, M> CronDriver<C, S, M>
where
    C: ClusterClient,
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    pub fn new(
        client: Arc<C>,
        reconciler: Arc<Reconciler<S, M>>,
        schedule: Schedule,
        namespace_selector: Option<String>,
        pod_selector: Option<String>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            client,
            reconciler,
            schedule,
            namespace_selector,
            pod_selector,
            guard: SingleFlight::new(),
            shutdown_timeout,
        }
    }

    /// The single-flight guard shared by all triggers.
    pub fn guard(&self) -> &SingleFlight {
        &self.guard
    }

    /// Sleeps until each scheduled tick and triggers a pass, until `cancel`
    /// fires. Waits up to `shutdown_timeout` for a running pass on exit.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            let Some(next) = self.schedule.upcoming(Utc).next() else {
                warn!("cron schedule has no upcoming execution");
                break;
            };
            info!(time = %next.to_rfc3339(), "next execution");
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("shutdown requested, no further passes will be scheduled");
                    break;
                }
                () = tokio::time::sleep(wait) => {}
            }
            self.trigger(&tracker);
        }

        tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, tracker.wait())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "reconciliation pass still running at shutdown deadline"
            );
        }
    }

    /// Starts a pass on `tracker` unless one is already running.
    ///
    /// Returns whether a pass was started.
    pub fn trigger(self: &Arc<Self>, tracker: &TaskTracker) -> bool {
        let Some(permit) = self.guard.try_begin() else {
            metrics::counter!(m::DAEMON_CRON_SKIPPED_TOTAL).increment(1);
            warn!("previous reconciliation pass still running, skipping this trigger");
            return false;
        };

        let driver = Arc::clone(self);
        tracker.spawn(async move {
            let _permit = permit;
            driver.run_pass().await;
        });
        true
    }

    /// One background-service execution.
    ///
    /// Returns `None` when nothing was reconciled: no target initialized, or
    /// the pod listing failed. A partial listing is never reconciled.
    pub async fn run_pass(&self) -> Option<PassReport> {
        info!("executing background service");

        let available = self.reconciler.initialize_targets().await;
        if available == 0 {
            error!("no catalog target could be initialized, skipping pass");
            return None;
        }

        let pods = match list_selected_pods(
            self.client.as_ref(),
            self.namespace_selector.as_deref(),
            self.pod_selector.as_deref(),
        )
        .await
        {
            Ok(pods) => pods,
            Err(e) => {
                error!(error = %e, "failed to list pods, skipping pass");
                return None;
            }
        };

        Some(self.reconciler.full_pass(&pods).await)
    }
}
