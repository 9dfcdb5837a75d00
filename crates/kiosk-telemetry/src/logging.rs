//! Structured logging setup.
//!
//! JSON output carries `timestamp`, `level`, `target`, the event fields and
//! the enclosing spans, so a log shipper can index `rfid` and
//! `connection_id` directly.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Build the filter from the configured directive
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level '{}': {}", config.log_level, e)))
}

/// Install the global subscriber.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;

    let result = if config.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(config.with_target),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
    };

    result.map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))
}
