//! # Adapter Container
//!
//! Picks and constructs the collaborator adapters the configuration asks
//! for and hands them to a [`GatewayService`].
//!
//! | Port | Adapter |
//! |------|---------|
//! | `UserStore` | `InMemoryUserStore` or `RocksDbUserStore` (feature `rocksdb`) |
//! | `BottleClassifier` | `OpenAiClassifier` |
//! | `VoucherNotifier` | `SmtpMailer`, `HttpMailer`, `LogMailer` or `UnconfiguredMailer` |

use std::sync::Arc;

use kiosk_gateway::adapters::{
    HttpMailer, InMemoryUserStore, LogMailer, OpenAiClassifier, SmtpMailer, UnconfiguredMailer,
};
use kiosk_gateway::domain::StorageBackend;
use kiosk_gateway::{
    BottleClassifier, GatewayConfig, GatewayError, GatewayService, UserStore, VoucherNotifier,
};
use tracing::{info, warn};

/// Constructed adapters, ready to be wired into a gateway.
pub struct KioskContainer {
    pub config: GatewayConfig,
    pub store: Arc<dyn UserStore>,
    pub classifier: Arc<dyn BottleClassifier>,
    pub notifier: Arc<dyn VoucherNotifier>,
}

impl KioskContainer {
    /// Build every adapter from configuration.
    pub fn build(config: GatewayConfig) -> Result<Self, GatewayError> {
        let store = open_store(&config)?;

        if config.classifier.api_key.is_none() {
            warn!("OPENAI_API_KEY not set, classifier requests will be unauthenticated");
        }
        let classifier: Arc<dyn BottleClassifier> =
            Arc::new(OpenAiClassifier::new(config.classifier.clone())?);

        let notifier = build_notifier(&config)?;

        Ok(Self {
            config,
            store,
            classifier,
            notifier,
        })
    }

    /// Consume the container into a gateway service.
    pub fn into_gateway(self) -> Result<GatewayService, GatewayError> {
        GatewayService::new(self.config, self.store, self.classifier, self.notifier)
    }
}

/// Log-only when asked for, then SMTP, then the HTTP relay. With none of
/// them configured, voucher requests fail.
fn build_notifier(config: &GatewayConfig) -> Result<Arc<dyn VoucherNotifier>, GatewayError> {
    let mailer = &config.mailer;
    if mailer.log_only {
        warn!("KIOSK_MAIL_LOG_ONLY set, vouchers will be logged and not sent");
        return Ok(Arc::new(LogMailer));
    }
    if mailer.smtp_credentials().is_some() {
        info!(host = %mailer.smtp_host, port = mailer.smtp_port, "Voucher mail over SMTP");
        return Ok(Arc::new(SmtpMailer::new(mailer)?));
    }
    if let Some(url) = &mailer.relay_url {
        info!(relay = %url, "Voucher mail relay configured");
        return Ok(Arc::new(HttpMailer::new(url.clone(), mailer.clone())?));
    }
    warn!("EMAIL_USER/EMAIL_PASS not set and no mail relay, voucher requests will fail");
    Ok(Arc::new(UnconfiguredMailer))
}

fn open_store(config: &GatewayConfig) -> Result<Arc<dyn UserStore>, GatewayError> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory user store (data is lost on restart)");
            Ok(Arc::new(InMemoryUserStore::new()))
        }
        StorageBackend::RocksDb => open_rocksdb(config),
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(config: &GatewayConfig) -> Result<Arc<dyn UserStore>, GatewayError> {
    use kiosk_gateway::adapters::{RocksDbConfig, RocksDbUserStore};

    let rocks_config = RocksDbConfig {
        path: config.storage.path.clone(),
        ..RocksDbConfig::default()
    };
    info!(path = ?rocks_config.path, "Opening RocksDB user store");
    let store = RocksDbUserStore::open(rocks_config)
        .map_err(|e| GatewayError::Storage(e.to_string()))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_config: &GatewayConfig) -> Result<Arc<dyn UserStore>, GatewayError> {
    Err(GatewayError::Storage(
        "rocksdb backend requested but kiosk-node was built without the `rocksdb` feature".into(),
    ))
}
