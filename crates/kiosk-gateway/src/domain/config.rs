//! Gateway configuration with validation.
//!
//! Defaults match a single-kiosk deployment; `GatewayConfig::from_env` layers
//! the environment on top.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// REST + push server configuration
    pub http: HttpConfig,
    /// Admin server configuration (localhost only by default)
    pub admin: AdminConfig,
    /// Push channel configuration
    pub websocket: WebSocketConfig,
    /// CORS configuration
    pub cors: CorsConfig,
    /// Timeout configuration
    pub timeouts: TimeoutConfig,
    /// Vision classifier configuration
    pub classifier: ClassifierConfig,
    /// Voucher mailer configuration
    pub mailer: MailerConfig,
    /// User store configuration
    pub storage: StorageConfig,
}

impl GatewayConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PORT` | `http.port` |
    /// | `KIOSK_ADMIN_PORT` | `admin.port` |
    /// | `FRONTEND_URL` | added to `cors.allowed_origins` |
    /// | `OPENAI_API_KEY` | `classifier.api_key` |
    /// | `KIOSK_CLASSIFIER_URL` | `classifier.endpoint` |
    /// | `EMAIL_USER` | `mailer.sender` and `mailer.smtp_username` |
    /// | `EMAIL_PASS` | `mailer.smtp_password` |
    /// | `KIOSK_SMTP_HOST` | `mailer.smtp_host` |
    /// | `KIOSK_SMTP_PORT` | `mailer.smtp_port` |
    /// | `KIOSK_MAIL_RELAY_URL` | `mailer.relay_url` |
    /// | `KIOSK_MAIL_API_KEY` | `mailer.api_key` |
    /// | `KIOSK_MAIL_LOG_ONLY` | `mailer.log_only` |
    /// | `KIOSK_STORAGE` | `storage.backend` (`memory` or `rocksdb`) |
    /// | `KIOSK_DATA_DIR` | `storage.path` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "PORT") {
            config.http.port = port;
        }
        if let Some(port) = parse_var(&lookup, "KIOSK_ADMIN_PORT") {
            config.admin.port = port;
        }
        if let Some(origin) = lookup("FRONTEND_URL").filter(|v| !v.trim().is_empty()) {
            config.cors.allowed_origins.push(origin.trim().to_string());
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            config.classifier.api_key = Some(key);
        }
        if let Some(url) = lookup("KIOSK_CLASSIFIER_URL") {
            config.classifier.endpoint = url;
        }
        if let Some(user) = lookup("EMAIL_USER").filter(|v| !v.trim().is_empty()) {
            config.mailer.sender = user.trim().to_string();
            config.mailer.smtp_username = Some(user.trim().to_string());
        }
        if let Some(pass) = lookup("EMAIL_PASS").filter(|v| !v.is_empty()) {
            config.mailer.smtp_password = Some(pass);
        }
        if let Some(host) = lookup("KIOSK_SMTP_HOST").filter(|v| !v.trim().is_empty()) {
            config.mailer.smtp_host = host.trim().to_string();
        }
        if let Some(port) = parse_var(&lookup, "KIOSK_SMTP_PORT") {
            config.mailer.smtp_port = port;
        }
        if let Some(log_only) = parse_var(&lookup, "KIOSK_MAIL_LOG_ONLY") {
            config.mailer.log_only = log_only;
        }
        if let Some(url) = lookup("KIOSK_MAIL_RELAY_URL").filter(|v| !v.trim().is_empty()) {
            config.mailer.relay_url = Some(url);
        }
        if let Some(key) = lookup("KIOSK_MAIL_API_KEY") {
            config.mailer.api_key = Some(key);
        }
        if let Some(backend) = lookup("KIOSK_STORAGE") {
            match backend.to_lowercase().as_str() {
                "memory" => config.storage.backend = StorageBackend::Memory,
                "rocksdb" => config.storage.backend = StorageBackend::RocksDb,
                other => warn!(backend = other, "Unknown KIOSK_STORAGE, keeping default"),
            }
        }
        if let Some(dir) = lookup("KIOSK_DATA_DIR") {
            config.storage.path = PathBuf::from(dir);
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.enabled && self.admin.enabled && self.http_addr() == self.admin_addr() {
            return Err(ConfigError::DuplicatePorts);
        }

        if !self.websocket.path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "websocket path must start with '/': {}",
                self.websocket.path
            )));
        }

        if self.websocket.max_message_size == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_message_size cannot be 0".into(),
            ));
        }

        if self.websocket.outbound_buffer == 0 {
            return Err(ConfigError::InvalidLimit(
                "outbound_buffer cannot be 0".into(),
            ));
        }

        if self.websocket.rate_limit == 0 {
            return Err(ConfigError::InvalidLimit("rate_limit cannot be 0".into()));
        }

        if self.websocket.ping_interval.is_zero() || self.websocket.idle_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "websocket ping_interval and idle_timeout cannot be 0".into(),
            ));
        }

        if self.timeouts.default.is_zero() || self.timeouts.classify.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request timeouts cannot be 0".into(),
            ));
        }

        Ok(())
    }

    /// Get REST server bind address
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http.host, self.http.port)
    }

    /// Get Admin server bind address
    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.admin.host, self.admin.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            info!(key, "Loaded from environment");
            Some(value)
        }
        Err(_) => {
            warn!(key, value = %raw, "Invalid value in environment, using default");
            None
        }
    }
}

/// REST server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address
    pub host: IpAddr,
    /// Port (default: 4000)
    pub port: u16,
    /// Enable REST server
    pub enabled: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4000,
            enabled: true,
        }
    }
}

/// Admin server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Bind address (localhost only by default)
    pub host: IpAddr,
    /// Port (default: 4001)
    pub port: u16,
    /// Enable admin server
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 4001,
            enabled: true,
        }
    }
}

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    /// Upgrade path on the REST listener
    pub path: String,
    /// Maximum inbound frame size in bytes
    pub max_message_size: usize,
    /// Queued push events per connection before new ones are dropped
    pub outbound_buffer: usize,
    /// Inbound frames per second per connection
    pub rate_limit: u32,
    /// Ping interval
    #[serde(with = "humantime_serde")]
    pub ping_interval: Duration,
    /// Disconnect after this long without any inbound frame
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/ws".to_string(),
            max_message_size: 16 * 1024,
            outbound_buffer: 64,
            rate_limit: 20,
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Enable CORS
    pub enabled: bool,
    /// Allowed origins ("*" for all)
    pub allowed_origins: Vec<String>,
    /// Allowed methods
    pub allowed_methods: Vec<String>,
    /// Allowed headers
    pub allowed_headers: Vec<String>,
    /// Max age for preflight cache (seconds)
    pub max_age: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: vec!["*".to_string()],
            allowed_methods: vec![
                "GET".to_string(),
                "POST".to_string(),
                "PUT".to_string(),
                "OPTIONS".to_string(),
            ],
            allowed_headers: vec!["Content-Type".to_string()],
            max_age: 3600,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Default timeout for most requests
    #[serde(with = "humantime_serde")]
    pub default: Duration,
    /// Timeout for bottle classification (vision API round trip)
    #[serde(with = "humantime_serde")]
    pub classify: Duration,
    /// Timeout for voucher delivery
    #[serde(with = "humantime_serde")]
    pub voucher: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(10),
            classify: Duration::from_secs(30),
            voucher: Duration::from_secs(20),
        }
    }
}

/// Vision classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Chat-completions endpoint
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Bearer token (None disables the remote classifier)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Question sent alongside the image
    pub prompt: String,
    /// HTTP client timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4.1-mini".to_string(),
            api_key: None,
            prompt: concat!(
                "Is this image a photo of a plastic water bottle? ",
                "I want the response to be a simple TRUE or FALSE."
            )
            .to_string(),
            request_timeout: Duration::from_secs(25),
        }
    }
}

/// Voucher mailer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailerConfig {
    /// SMTP server, reached with STARTTLS
    pub smtp_host: String,
    pub smtp_port: u16,
    /// SMTP login; SMTP is used when both username and password are set
    pub smtp_username: Option<String>,
    #[serde(skip_serializing)]
    pub smtp_password: Option<String>,
    /// HTTP mail relay endpoint, used when no SMTP login is configured
    pub relay_url: Option<String>,
    /// Bearer token for the relay
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// From address
    pub sender: String,
    /// Subject line
    pub subject: String,
    /// Delivery timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Log vouchers instead of sending them (development only)
    pub log_only: bool,
}

impl MailerConfig {
    /// SMTP username and password, when both are present
    pub fn smtp_credentials(&self) -> Option<(&str, &str)> {
        match (&self.smtp_username, &self.smtp_password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            relay_url: None,
            api_key: None,
            sender: "kiosk@localhost".to_string(),
            subject: "Your Voucher Code".to_string(),
            request_timeout: Duration::from_secs(15),
            log_only: false,
        }
    }
}

/// Which user store to open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// RocksDB on disk (requires the `rocksdb` feature)
    #[serde(rename = "rocksdb")]
    RocksDb,
}

/// User store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Database directory for on-disk backends
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: PathBuf::from("./data/kiosk"),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// REST and admin servers share an address
    #[error("duplicate ports configured")]
    DuplicatePorts,
    /// Invalid size or count limit
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Invalid timeout value
    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),
    /// General configuration error
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Humantime serde module for Duration serialization
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() != 0 {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        } else {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(super) fn parse_duration(s: &str) -> Result<Duration, &'static str> {
        let s = s.trim();
        // "ms" before "s" and "m", both of which it ends with
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| "invalid milliseconds")
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid seconds")
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m * 60))
                .map_err(|_| "invalid minutes")
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| "invalid duration format")
        }
    }
}
