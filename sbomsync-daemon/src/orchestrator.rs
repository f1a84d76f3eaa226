//! Assembly and lifecycle management.
//!
//! The [`Orchestrator`] loads configuration, builds the collaborators and the
//! reconciler, starts the health endpoint, and runs one driver until a
//! shutdown signal arrives.
//!
//! # Startup
//!
//! 1. Load `sbomsync.toml` (optional), apply env and CLI overrides, validate
//! 2. Install the metrics recorder (if enabled)
//! 3. Build the trivy scanner, the Kubernetes client, and the DevGuard target
//! 4. Bind the health endpoint
//! 5. Run the cron driver (`daemon.cron` set) or the watch driver
//!
//! # Shutdown
//!
//! SIGTERM/SIGINT cancel a shared token. The driver drains in-flight work up
//! to `daemon.shutdown_timeout_secs`, then the health server stops.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cron::Schedule;
use tokio_util::sync::CancellationToken;

use sbomsync_cluster::{KubeClientConfig, KubeClusterClient, selector};
use sbomsync_core::config::SbomSyncConfig;
use sbomsync_devguard::{DevGuardTarget, DevGuardTargetConfig};
use sbomsync_reconciler::{ReconcilerBuilder, ReconcilerConfig};
use sbomsync_sbom_scanner::{TrivyScannerBuilder, TrivyScannerConfig};

use crate::batch::{CronDriver, parse_schedule};
use crate::cli::DaemonCli;
use crate::health::{self, HealthState};
use crate::metrics_server;
use crate::watch::WatchDriver;

/// How the daemon feeds the reconciler.
#[derive(Debug, Clone)]
pub enum RunMode {
    /// Continuous pod watch
    Watch,
    /// Periodic full passes
    Cron(Schedule),
}

impl RunMode {
    /// Name reported on `/status`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Watch => "watch",
            Self::Cron(_) => "cron",
        }
    }
}

/// Loads the configuration the daemon will run with.
///
/// Order: defaults, then the config file (if given), then
/// `SBOMSYNC_<SECTION>_<FIELD>` variables, then CLI flags.
pub async fn load_config(cli: &DaemonCli) -> Result<SbomSyncConfig> {
    let mut config = match &cli.config {
        Some(path) => SbomSyncConfig::from_file(path)
            .await
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SbomSyncConfig::default(),
    };
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    Ok(config)
}

/// Validates the configuration and picks the run mode.
///
/// These are the only fatal errors.
pub fn validate(config: &SbomSyncConfig) -> Result<RunMode> {
    config.validate().context("config validation failed")?;
    ReconcilerConfig::from_core(config)
        .validate()
        .context("config validation failed")?;
    if config.devguard.enabled {
        DevGuardTargetConfig::from_core(&config.devguard).context("config validation failed")?;
    }
    match config.daemon.cron_expression() {
        Some(expr) => Ok(RunMode::Cron(parse_schedule(&expr)?)),
        None => Ok(RunMode::Watch),
    }
}

/// The daemon's top-level coordinator.
pub struct Orchestrator {
    config: SbomSyncConfig,
    mode: RunMode,
}

impl Orchestrator {
    /// Validates `config` and prepares the orchestrator.
    pub fn new(config: SbomSyncConfig) -> Result<Self> {
        let mode = validate(&config)?;
        Ok(Self { config, mode })
    }

    pub fn config(&self) -> &SbomSyncConfig {
        &self.config
    }

    pub fn mode(&self) -> &RunMode {
        &self.mode
    }

    /// Builds everything and runs until a shutdown signal.
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let scanner = TrivyScannerBuilder::new()
            .config(TrivyScannerConfig::from_core(&config.scanner))
            .build()
            .context("failed to build trivy scanner")?;

        let cluster = Arc::new(
            KubeClusterClient::connect(KubeClientConfig::from_core(&config.cluster))
                .await
                .context("failed to connect to the Kubernetes API")?,
        );

        let mut builder = ReconcilerBuilder::new()
            .config(ReconcilerConfig::from_core(&config))
            .scanner(Arc::new(scanner))
            .marker(Arc::clone(&cluster));
        if config.devguard.enabled {
            let target_config = DevGuardTargetConfig::from_core(&config.devguard)?;
            builder = builder.add_target(Arc::new(DevGuardTarget::new(target_config)?));
        } else {
            tracing::warn!("devguard target disabled, images will not be catalogued");
        }
        let reconciler = Arc::new(builder.build().context("failed to build reconciler")?);

        let listener =
            health::bind(&config.daemon.health_listen_addr, config.daemon.health_port).await?;
        let cancel = CancellationToken::new();
        let health_task = health::spawn_health_server(
            listener,
            HealthState::new(reconciler.clone(), self.mode.name()),
            cancel.clone(),
        );
        let signal_task = spawn_signal_listener(cancel.clone());

        let shutdown_timeout = Duration::from_secs(config.daemon.shutdown_timeout_secs);
        let pod_selector = selector(&config.cluster.pod_label_selector).map(str::to_owned);
        tracing::info!(
            mode = self.mode.name(),
            version = env!("CARGO_PKG_VERSION"),
            "sbomsync-daemon started"
        );

        match self.mode {
            RunMode::Cron(schedule) => {
                let namespace_selector =
                    selector(&config.cluster.namespace_label_selector).map(str::to_owned);
                let driver = Arc::new(CronDriver::new(
                    cluster,
                    reconciler,
                    schedule,
                    namespace_selector,
                    pod_selector,
                    shutdown_timeout,
                ));
                driver.run(cancel.clone()).await;
            }
            RunMode::Watch => {
                let summary = WatchDriver::new(cluster, reconciler, pod_selector, shutdown_timeout)
                    .run(cancel.clone())
                    .await;
                tracing::info!(events = summary.events, timed_out = summary.timed_out, "watch driver stopped");
            }
        }

        // the driver may also stop on its own (stream ended)
        cancel.cancel();
        signal_task.abort();
        if let Err(e) = health_task.await {
            tracing::warn!(error = %e, "health server task failed");
        }
        tracing::info!("sbomsync-daemon shut down");
        Ok(())
    }
}

fn spawn_signal_listener(cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => tracing::info!(signal, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "could not install signal handlers, shutting down"),
        }
        cancel.cancel();
    })
}

/// Waits for SIGTERM or SIGINT and returns the signal name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SbomSyncConfig {
        let mut config = SbomSyncConfig::default();
        config.devguard.token = "token".to_owned();
        config.devguard.project_name = "acme/projects/prod".to_owned();
        config
    }

    #[test]
    fn empty_cron_means_watch_mode() {
        let mode = validate(&valid_config()).unwrap();
        assert_eq!(mode.name(), "watch");
    }

    #[test]
    fn quoted_cron_selects_cron_mode() {
        let mut config = valid_config();
        config.daemon.cron = "\"0 0 * * * *\"".to_owned();
        let mode = validate(&config).unwrap();
        assert_eq!(mode.name(), "cron");
    }

    #[test]
    fn invalid_cron_is_fatal() {
        let mut config = valid_config();
        config.daemon.cron = "every five minutes".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn missing_token_is_fatal() {
        let mut config = valid_config();
        config.devguard.token.clear();
        let err = validate(&config).unwrap_err();
        assert!(format!("{err:#}").contains("devguard.token"));
    }

    #[test]
    fn disabled_devguard_needs_no_credentials() {
        let mut config = SbomSyncConfig::default();
        config.devguard.enabled = false;
        assert!(Orchestrator::new(config).is_ok());
    }
}
