//! Domain types for the kiosk gateway.
//!
//! Core records, configuration and error handling. Nothing in here performs I/O.

pub mod config;
pub mod connection_id;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::{ConfigError, GatewayConfig, StorageBackend};
pub use connection_id::ConnectionId;
pub use error::{ApiError, ApiResult, GatewayError};
pub use types::*;
