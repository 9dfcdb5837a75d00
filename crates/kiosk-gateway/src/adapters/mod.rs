//! Adapters for the kiosk gateway.
//!
//! Implementations of the outbound ports: user stores, the vision
//! classifier and the voucher mailer.

pub mod mailer;
pub mod memory_store;
pub mod openai_classifier;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_store;

pub use mailer::{render_voucher_html, HttpMailer, LogMailer, SmtpMailer, UnconfiguredMailer};
pub use memory_store::InMemoryUserStore;
pub use openai_classifier::OpenAiClassifier;
#[cfg(feature = "rocksdb")]
pub use rocksdb_store::{RocksDbConfig, RocksDbUserStore};
