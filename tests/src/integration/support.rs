//! Test fixtures shared by the integration flows.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use kiosk_gateway::adapters::InMemoryUserStore;
use kiosk_gateway::ports::{ClassifierError, NotifierError, StoreError};
use kiosk_gateway::{
    BottleClassifier, EncodedImage, GatewayConfig, GatewayService, NewTransaction, NewUser, Rfid,
    TransactionRecord, UserId, UserRecord, UserStore, VoucherNotifier,
};
use parking_lot::Mutex;

// =============================================================================
// SCRIPTED COLLABORATORS
// =============================================================================

/// Classifier that answers with a fixed verdict, or fails when `None`
pub struct ScriptedClassifier(pub Option<bool>);

#[async_trait]
impl BottleClassifier for ScriptedClassifier {
    async fn classify(&self, _image: &EncodedImage) -> Result<bool, ClassifierError> {
        self.0
            .ok_or_else(|| ClassifierError::UnexpectedAnswer("MAYBE".into()))
    }
}

/// Notifier that records every delivery
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

#[async_trait]
impl VoucherNotifier for RecordingNotifier {
    async fn send_voucher(&self, recipient: &str, code: &str) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Rejected { status: 503 });
        }
        self.sent.lock().push((recipient.to_string(), code.to_string()));
        Ok(())
    }
}

/// In-memory store whose balance writes always fail
pub struct BalanceWriteFails(pub InMemoryUserStore);

#[async_trait]
impl UserStore for BalanceWriteFails {
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.0.list_users().await
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        self.0.insert_user(user).await
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.0.user_by_id(id).await
    }

    async fn user_by_rfid(&self, rfid: &str) -> Result<Option<UserRecord>, StoreError> {
        self.0.user_by_rfid(rfid).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.0.user_by_email(email).await
    }

    async fn update_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        self.0.update_details(rfid, name, email).await
    }

    async fn update_password(&self, id: UserId, password: &str) -> Result<UserRecord, StoreError> {
        self.0.update_password(id, password).await
    }

    async fn update_balance(
        &self,
        _rfid: &str,
        _new_balance: i64,
    ) -> Result<UserRecord, StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }

    async fn transactions_for(&self, rfid: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        self.0.transactions_for(rfid).await
    }

    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        self.0.insert_transaction(transaction).await
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

pub fn user(rfid: &str, email: &str, balance: i64) -> NewUser {
    NewUser {
        rfid: Rfid::from(rfid),
        name: "Kiosk User".into(),
        email: email.into(),
        password: "secret".into(),
        balance,
        permission: "user".into(),
    }
}

/// Config for tests: ephemeral ports and slow pings
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.http.port = 0;
    config.admin.port = 0;
    config.websocket.ping_interval = Duration::from_secs(60);
    config
}

pub struct Fixture {
    pub gateway: Arc<GatewayService>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Gateway over an in-memory store seeded with `users`
pub fn fixture(users: Vec<NewUser>) -> Fixture {
    let store = InMemoryUserStore::with_users(users).expect("seed users");
    fixture_with_store(Arc::new(store), Some(true))
}

pub fn fixture_with_store(store: Arc<dyn UserStore>, verdict: Option<bool>) -> Fixture {
    let notifier = Arc::new(RecordingNotifier::default());
    let gateway = GatewayService::new(
        test_config(),
        store,
        Arc::new(ScriptedClassifier(verdict)),
        notifier.clone(),
    )
    .expect("gateway");
    Fixture {
        gateway: Arc::new(gateway),
        notifier,
    }
}

// =============================================================================
// REQUEST HELPERS
// =============================================================================

pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn json(method: Method, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn read_text(response: Response<Body>) -> (StatusCode, String) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

pub async fn read_json(response: Response<Body>) -> (StatusCode, serde_json::Value) {
    let (status, text) = read_text(response).await;
    (status, serde_json::from_str(&text).unwrap())
}
