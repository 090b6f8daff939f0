//! Service entry point.

use clap::Parser;
use desk_orchestrator::{AppConfig, Orchestrator};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "desk-orchestrator", about = "Data orchestration service")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Pin the service to the fallback store regardless of probe results.
    #[arg(long)]
    force_offline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    desk_telemetry::init_logging()?;

    let config = if cli.config.exists() {
        AppConfig::from_file(&cli.config)?
    } else {
        info!(
            path = %cli.config.display(),
            "Config file not found, using offline defaults"
        );
        AppConfig::default()
    };

    let orchestrator = Orchestrator::new(config)?;
    if cli.force_offline {
        orchestrator.monitor().set_force_offline(true);
    }
    orchestrator.run().await?;
    Ok(())
}
