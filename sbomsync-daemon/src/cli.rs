//! CLI argument definitions for sbomsync-daemon.
//!
//! Uses `clap` v4 derive macros. Every flag also reads an environment
//! variable, and any flag that is set overrides both the config file and the
//! `SBOMSYNC_<SECTION>_<FIELD>` overrides.

use std::path::PathBuf;

use clap::Parser;

use sbomsync_core::config::SbomSyncConfig;

/// Kubernetes image inventory reconciler.
///
/// Scans every image running in the cluster with trivy and keeps the
/// DevGuard catalog in sync with what is actually running.
#[derive(Parser, Debug, Default)]
#[command(name = "sbomsync-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to sbomsync.toml. Defaults apply when omitted.
    #[arg(short, long, env = "SBOMSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long)]
    pub log_format: Option<String>,

    /// Background-service interval as a six-field cron expression.
    /// Empty means watch mode.
    #[arg(long, env = "SBOM_CRON")]
    pub cron: Option<String>,

    /// Kubernetes label selector for pods.
    #[arg(long, env = "SBOM_POD_LABEL_SELECTOR")]
    pub pod_label_selector: Option<String>,

    /// Kubernetes label selector for namespaces.
    #[arg(long, env = "SBOM_NAMESPACE_LABEL_SELECTOR")]
    pub namespace_label_selector: Option<String>,

    /// Analyze every image, including those from already annotated pods.
    #[arg(long)]
    pub ignore_annotations: bool,

    /// Registry proxy mapping `registry=proxy`. Repeatable.
    #[arg(long = "registry-proxy", value_name = "FROM=TO")]
    pub registry_proxies: Vec<String>,

    /// Scanner job timeout in seconds.
    #[arg(long = "job-timeout", value_name = "SECS")]
    pub job_timeout_secs: Option<u64>,

    /// DevGuard API token.
    #[arg(long, env = "SBOM_DEVGUARD_TOKEN", hide_env_values = true)]
    pub devguard_token: Option<String>,

    /// DevGuard API URL.
    #[arg(long, env = "SBOM_DEVGUARD_API_URL")]
    pub devguard_api_url: Option<String>,

    /// DevGuard root project (e.g. my-org/projects/my-cluster).
    #[arg(long, env = "SBOM_DEVGUARD_PROJECT_NAME")]
    pub devguard_project_name: Option<String>,

    /// Port for the /health and /status endpoints.
    #[arg(long)]
    pub health_port: Option<u16>,

    /// Validate configuration and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Writes every flag that was given into `config`.
    pub fn apply_overrides(&self, config: &mut SbomSyncConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(cron) = &self.cron {
            config.daemon.cron.clone_from(cron);
        }
        if let Some(selector) = &self.pod_label_selector {
            config.cluster.pod_label_selector.clone_from(selector);
        }
        if let Some(selector) = &self.namespace_label_selector {
            config.cluster.namespace_label_selector.clone_from(selector);
        }
        if self.ignore_annotations {
            config.cluster.ignore_annotations = true;
        }
        if !self.registry_proxies.is_empty() {
            config.scanner.registry_proxies = self
                .registry_proxies
                .iter()
                .flat_map(|p| p.split(','))
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(secs) = self.job_timeout_secs {
            config.scanner.job_timeout_secs = secs;
        }
        if let Some(token) = &self.devguard_token {
            config.devguard.token.clone_from(token);
        }
        if let Some(url) = &self.devguard_api_url {
            config.devguard.api_url.clone_from(url);
        }
        if let Some(name) = &self.devguard_project_name {
            config.devguard.project_name.clone_from(name);
        }
        if let Some(port) = self.health_port {
            config.daemon.health_port = port;
        }
    }
}
