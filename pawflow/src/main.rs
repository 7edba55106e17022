mod system;

use log::{error, info};

use pawflow_config::parse_config;
use pawflow_models::errors::SendableError;
use pawflow_utilities::startup;

use crate::system::AutomationSystem;

#[tokio::main]
async fn main() -> Result<(), SendableError> {
    let config = parse_config()?;
    startup::startup("Pawflow Automation Engine", &config.log_file)?;

    let mut system = AutomationSystem::new(config)?;
    system.start().await?;

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
    info!("Received shutdown signal. Shutting down...");

    if let Err(err) = system.shutdown().await {
        error!("Error while shutting down automation system: {:?}", err);
    }

    info!("Automation system shutdown complete.");
    Ok(())
}
