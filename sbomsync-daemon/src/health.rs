//! Liveness and status endpoints.
//!
//! - `GET /health` answers `200 Running!` while the process is up. It does
//!   not depend on scan or upload outcomes.
//! - `GET /status` returns a [`DaemonStatus`] JSON document with reconciler
//!   counters and per-target health.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use sbomsync_core::marker::PodMarker;
use sbomsync_core::pipeline::HealthStatus;
use sbomsync_core::scan::ImageScanner;
use sbomsync_reconciler::{Reconciler, StatsSnapshot, TargetStatus};

/// Status report served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    /// Aggregated target health
    pub status: HealthStatus,
    /// `watch` or `cron`
    pub mode: &'static str,
    /// Seconds since start
    pub uptime_secs: u64,
    /// Number of claimed image identities
    pub ledger_size: usize,
    /// Reconciler counters
    pub stats: StatsSnapshot,
    /// Per-target health
    pub targets: Vec<TargetStatus>,
}

/// Source of the values reported on `/status`.
pub trait StatusProvider: Send + Sync + 'static {
    /// Aggregated health
    fn health(&self) -> HealthStatus;
    /// Ledger size
    fn ledger_size(&self) -> usize;
    /// Counters
    fn stats(&self) -> StatsSnapshot;
    /// Per-target health
    fn targets(&self) -> Vec<TargetStatus>;
}

impl<S, M> StatusProvider for Reconciler<S, M>
where
    S: ImageScanner + 'static,
    M: PodMarker + 'static,
{
    fn health(&self) -> HealthStatus {
        Reconciler::health(self)
    }

    fn ledger_size(&self) -> usize {
        self.ledger().len()
    }

    fn stats(&self) -> StatsSnapshot {
        Reconciler::stats(self)
    }

    fn targets(&self) -> Vec<TargetStatus> {
        self.target_statuses()
    }
}

/// Shared state of the health router.
#[derive(Clone)]
pub struct HealthState {
    provider: Arc<dyn StatusProvider>,
    mode: &'static str,
    started: Instant,
}

impl HealthState {
    pub fn new(provider: Arc<dyn StatusProvider>, mode: &'static str) -> Self {
        Self {
            provider,
            mode,
            started: Instant::now(),
        }
    }

    /// Current status report.
    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            status: self.provider.health(),
            mode: self.mode,
            uptime_secs: self.started.elapsed().as_secs(),
            ledger_size: self.provider.ledger_size(),
            stats: self.provider.stats(),
            targets: self.provider.targets(),
        }
    }
}

/// Builds the `/health` + `/status` router.
pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .with_state(state)
}

async fn health() -> &'static str {
    "Running!"
}

async fn status(State(state): State<HealthState>) -> Json<DaemonStatus> {
    Json(state.status())
}

/// Binds the health listener.
///
/// Binding happens before the drivers start so that a port conflict fails
/// startup instead of a background task.
pub async fn bind(addr: &str, port: u16) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{addr}:{port}")
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid health listen address: {}", e))?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind health endpoint on {}: {}", addr, e))?;
    tracing::info!(listen_addr = %addr, "health endpoint listening");
    Ok(listener)
}

/// Serves the router until `cancel` fires.
pub fn spawn_health_server(
    listener: TcpListener,
    state: HealthState,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let result = axum::serve(listener, router(state))
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                tracing::debug!("health server shutting down");
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "health server failed");
        }
    })
}
