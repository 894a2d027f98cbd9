//! Signal handling for graceful shutdown

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::service::ServiceState;

/// Resolves on the first Ctrl+C or SIGTERM
pub fn setup_signal_handlers() -> Result<mpsc::Receiver<()>> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C signal: {}", e);
            return;
        }

        info!("Ctrl+C signal received");
        let _ = ctrl_c_tx.send(()).await;
    });

    #[cfg(unix)]
    {
        use signal_hook::consts::SIGTERM;
        use std::sync::atomic::{AtomicBool, Ordering};

        let terminated = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(SIGTERM, Arc::clone(&terminated))?;

        tokio::spawn(async move {
            loop {
                if terminated.load(Ordering::Relaxed) {
                    info!("SIGTERM signal received");
                    let _ = shutdown_tx.send(()).await;
                    break;
                }
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        });
    }

    Ok(shutdown_rx)
}

/// Stops the scheduler, then the gateway, each bounded by the shutdown timeout
pub async fn graceful_shutdown(
    service_state: Arc<ServiceState>,
    gateway_handle: tokio::task::JoinHandle<()>,
) -> Result<()> {
    info!("Starting graceful shutdown...");
    let shutdown_timeout = service_state.config.shutdown_timeout();

    service_state.stop_scheduler().await;
    service_state.stop_gateway();

    match timeout(shutdown_timeout, gateway_handle).await {
        Ok(Ok(())) => {
            info!("Market gateway stopped gracefully");
        }
        Ok(Err(e)) => {
            error!("Market gateway task failed: {}", e);
        }
        Err(_) => {
            warn!("Market gateway did not stop within timeout, forcing shutdown");
        }
    }

    info!("Graceful shutdown complete");
    Ok(())
}
