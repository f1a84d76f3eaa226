use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use sbomsync_daemon::cli::DaemonCli;
use sbomsync_daemon::logging;
use sbomsync_daemon::orchestrator::{self, Orchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = DaemonCli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("sbomsync-daemon: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: DaemonCli) -> Result<()> {
    let config = orchestrator::load_config(&cli).await?;

    if cli.validate {
        let mode = orchestrator::validate(&config)?;
        println!("configuration is valid ({} mode)", mode.name());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    let orchestrator = Orchestrator::new(config)?;
    orchestrator.run().await
}
