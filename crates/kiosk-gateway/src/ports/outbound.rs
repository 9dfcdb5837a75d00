//! Outbound ports for the kiosk gateway.
//!
//! The gateway depends on three external collaborators: the user database,
//! the vision classifier and the voucher mailer. Each is a trait so the
//! service can run against in-memory fakes in tests.

use async_trait::async_trait;

use crate::domain::types::{
    EncodedImage, NewTransaction, NewUser, TransactionRecord, UserId, UserRecord,
};

/// Persistence for users and their transaction history.
///
/// Every method is a single statement against the backing store; nothing
/// here spans more than one call.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users, ordered by id
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Insert a user. Fails with `Duplicate` if the RFID or email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    async fn user_by_rfid(&self, rfid: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Replace name and email of the user holding `rfid`
    async fn update_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError>;

    async fn update_password(&self, id: UserId, password: &str) -> Result<UserRecord, StoreError>;

    /// Overwrite the stored balance of the user holding `rfid`
    async fn update_balance(&self, rfid: &str, new_balance: i64)
        -> Result<UserRecord, StoreError>;

    /// Transactions recorded for `rfid`, oldest first
    async fn transactions_for(&self, rfid: &str) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError>;
}

/// Decides whether a photo shows a plastic bottle
#[async_trait]
pub trait BottleClassifier: Send + Sync {
    async fn classify(&self, image: &EncodedImage) -> Result<bool, ClassifierError>;
}

/// Delivers voucher codes to users
#[async_trait]
pub trait VoucherNotifier: Send + Sync {
    async fn send_voucher(&self, recipient: &str, code: &str) -> Result<(), NotifierError>;
}

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No user matched the lookup key
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Unique column already holds this value
    #[error("duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// Stored bytes could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Underlying database failure
    #[error("backend error: {0}")]
    Backend(String),
}

/// Classifier errors
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("classifier timed out")]
    Timeout,

    #[error("classifier returned no answer")]
    EmptyAnswer,

    #[error("classifier answer is neither TRUE nor FALSE: {0:?}")]
    UnexpectedAnswer(String),
}

/// Notifier errors
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mail relay rejected message with status {status}")]
    Rejected { status: u16 },

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("could not build voucher message: {0}")]
    Message(String),

    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),

    #[error("no mail transport configured")]
    NotConfigured,
}
