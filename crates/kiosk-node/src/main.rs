//! # Kiosk Node
//!
//! Entry point for the recycling kiosk backend.
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from the environment
//! 2. Initialize telemetry
//! 3. Validate configuration
//! 4. Build adapters (store, classifier, mailer)
//! 5. Serve REST, push and admin listeners until Ctrl+C or SIGTERM

use anyhow::{Context, Result};
use kiosk_gateway::{GatewayConfig, ShutdownHandle};
use kiosk_node::KioskContainer;
use kiosk_telemetry::{init_telemetry, TelemetryConfig};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = GatewayConfig::from_env();
    config.validate().context("Invalid gateway configuration")?;

    info!("===========================================");
    info!("  Recycling Kiosk Node v{}", kiosk_gateway::VERSION);
    info!("===========================================");
    info!("REST Port: {}", config.http.port);
    info!("Admin Port: {}", config.admin.port);
    info!("Storage: {:?} at {:?}", config.storage.backend, config.storage.path);

    let gateway = KioskContainer::build(config)
        .and_then(|container| container.into_gateway())
        .context("Failed to build kiosk gateway")?;

    tokio::spawn(shutdown_signal(gateway.shutdown_handle()));

    if let Err(e) = gateway.run().await {
        error!(error = %e, "Gateway terminated with error");
        return Err(e.into());
    }

    info!("Kiosk node stopped");
    Ok(())
}

async fn shutdown_signal(handle: ShutdownHandle) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    handle.trigger();
}
