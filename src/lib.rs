pub mod api;
pub mod cli;
pub mod core;
pub mod harvest;
pub mod providers;
pub mod series;
pub mod snapshot;
pub mod store;

pub use crate::core::config;

use anyhow::Result;
use tracing::{debug, info};

pub enum AppCommand {
    Snapshot,
    Harvest(cli::harvest::HarvestArgs),
    Serve { listen: Option<String> },
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("cardpulse starting...");

    let config = config::AppConfig::load(config_path)?;
    debug!(
        database = %config.database_url,
        pricing_base_url = %config.pricing_base_url,
        "Loaded config"
    );

    match command {
        AppCommand::Snapshot => cli::snapshot::run(&config).await,
        AppCommand::Harvest(args) => cli::harvest::run(&config, &args).await,
        AppCommand::Serve { listen } => cli::serve::run(&config, listen.as_deref()).await,
    }
}
