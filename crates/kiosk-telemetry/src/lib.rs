//! # Kiosk Telemetry
//!
//! Structured logging for the kiosk services, built on `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kiosk_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `KIOSK_SERVICE_NAME` | `kiosk-node` | Service name in logs |
//! | `KIOSK_LOG_LEVEL` / `RUST_LOG` | `info` | Filter directive |
//! | `KIOSK_JSON_LOGS` | `true` in containers | JSON log lines |

mod config;
mod logging;

pub use config::TelemetryConfig;
pub use logging::build_filter;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

/// Initialize logging for the process.
///
/// Returns a guard that should be held for the lifetime of the application;
/// dropping it logs the shutdown.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    logging::init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        level = %config.log_level,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry...");
    }
}
