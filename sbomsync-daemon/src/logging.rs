//! Logging initialization for sbomsync-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `SbomSyncConfig`. `RUST_LOG` takes precedence over the configured level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use sbomsync_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - JSON lines (default)
/// * `"pretty"` - human-readable output for local runs
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = build_filter(&config.log_level);

    match config.log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)),
        other => Err(anyhow::anyhow!(
            "unknown log format '{}', expected 'json' or 'pretty'",
            other
        )),
    }
}

/// `RUST_LOG` if set, otherwise the configured level for sbomsync crates
/// and `warn` for dependencies.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,sbomsync_core={level},sbomsync_cluster={level},sbomsync_sbom_scanner={level},\
             sbomsync_devguard={level},sbomsync_reconciler={level},sbomsync_daemon={level}"
        ))
    })
}
