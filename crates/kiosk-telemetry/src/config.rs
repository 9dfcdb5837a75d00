//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for the kiosk services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// `EnvFilter` directive (trace, debug, info, warn, error or per-target)
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,

    /// Include the event target (module path) in output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "kiosk-node".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `KIOSK_SERVICE_NAME`: Service name (default: kiosk-node)
    /// - `KIOSK_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `KIOSK_JSON_LOGS`: JSON output (default: true in containers, false otherwise)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let is_container =
            lookup("KUBERNETES_SERVICE_HOST").is_some() || lookup("DOCKER_CONTAINER").is_some();

        Self {
            service_name: lookup("KIOSK_SERVICE_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.service_name),

            log_level: lookup("KIOSK_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),

            json_logs: lookup("KIOSK_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(is_container),

            with_target: defaults.with_target,
        }
    }
}
