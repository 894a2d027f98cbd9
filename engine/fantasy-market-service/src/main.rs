//! Fantasy Market Service
//!
//! Entry point: loads configuration, wires the store, engine, scheduler and
//! HTTP gateway, then runs until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use fantasy_market_service::{
    graceful_shutdown, initialize_logging, load_configuration, setup_signal_handlers, Cli,
    ServiceState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_configuration(cli.config.as_deref())?;
    initialize_logging(&config.logging)?;

    info!("Starting Fantasy Market Service v{}", env!("CARGO_PKG_VERSION"));

    let service_state = Arc::new(ServiceState::new(config).await?);
    service_state.install_metrics_exporter()?;
    info!("Service state initialized");

    if let (Some(league_id), Some(catalog)) = (cli.seed_league, cli.catalog.as_deref()) {
        service_state
            .seed_league_from_file(league_id, catalog)
            .await
            .context("League seeding failed")?;
    }

    let mut shutdown_signal = setup_signal_handlers()?;
    info!("Signal handlers configured");

    service_state.start_scheduler()?;

    let gateway_handle = {
        let state = service_state.clone();
        tokio::spawn(async move {
            if let Err(e) = state.run_gateway().await {
                error!("Market gateway failed: {:#}", e);
            }
        })
    };

    info!("Fantasy Market Service is running. Press Ctrl+C to shutdown gracefully.");
    let _ = shutdown_signal.recv().await;

    info!("Shutdown signal received. Initiating graceful shutdown...");
    graceful_shutdown(service_state, gateway_handle).await?;

    info!("Fantasy Market Service shutdown complete");
    Ok(())
}
