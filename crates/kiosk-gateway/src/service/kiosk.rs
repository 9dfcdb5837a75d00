//! Kiosk operations behind the REST surface.
//!
//! Each operation is one call to a collaborator. The only derived value is
//! the new balance (`old + delta`), and the only side effect besides the
//! collaborator call is the `balanceUpdate` push after a balance change.

use crate::domain::types::{
    BalanceUpdate, EncodedImage, NewTransaction, NewUser, Rfid, TransactionRecord, UserId,
    UserProfile,
};
use crate::domain::{ApiError, ApiResult};
use crate::middleware::metrics::GatewayMetrics;
use crate::ports::outbound::{BottleClassifier, UserStore, VoucherNotifier};
use crate::ws::registry::{BroadcastReport, ConnectionRegistry};
use std::sync::Arc;
use tracing::{info, instrument};

/// Result of a balance adjustment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub user: UserProfile,
    pub previous_balance: i64,
    pub push: BroadcastReport,
}

/// Application service shared by all REST handlers
pub struct KioskService {
    store: Arc<dyn UserStore>,
    classifier: Arc<dyn BottleClassifier>,
    notifier: Arc<dyn VoucherNotifier>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<GatewayMetrics>,
}

impl KioskService {
    pub fn new(
        store: Arc<dyn UserStore>,
        classifier: Arc<dyn BottleClassifier>,
        notifier: Arc<dyn VoucherNotifier>,
        registry: Arc<ConnectionRegistry>,
        metrics: Arc<GatewayMetrics>,
    ) -> Self {
        Self {
            store,
            classifier,
            notifier,
            registry,
            metrics,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn list_users(&self) -> ApiResult<Vec<UserProfile>> {
        let users = self
            .store
            .list_users()
            .await
            .map_err(|e| ApiError::from_store(e, "Users not found", "Error fetching users"))?;
        Ok(users.into_iter().map(UserProfile::from).collect())
    }

    #[instrument(skip(self, user), fields(rfid = %user.rfid))]
    pub async fn add_user(&self, user: NewUser) -> ApiResult<UserProfile> {
        let Some(rfid) = Rfid::parse(user.rfid.as_str()) else {
            return Err(ApiError::bad_request("rfid is required"));
        };
        if user.email.trim().is_empty() {
            return Err(ApiError::bad_request("email is required"));
        }

        let created = self
            .store
            .insert_user(NewUser { rfid, ..user })
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error Adding User"))?;

        info!(id = created.id, email = %created.email, "User added");
        Ok(created.into())
    }

    pub async fn user_by_email(&self, email: &str) -> ApiResult<UserProfile> {
        self.store
            .user_by_email(email)
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error fetching user"))?
            .map(UserProfile::from)
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    pub async fn user_by_rfid(&self, rfid: &str) -> ApiResult<UserProfile> {
        self.store
            .user_by_rfid(rfid)
            .await
            .map_err(|e| {
                ApiError::from_store(e, "RFID mapping not found", "Error fetching RFID mapping")
            })?
            .map(UserProfile::from)
            .ok_or_else(|| ApiError::not_found("RFID mapping not found"))
    }

    #[instrument(skip(self, name, email))]
    pub async fn edit_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> ApiResult<UserProfile> {
        if email.trim().is_empty() {
            return Err(ApiError::bad_request("email is required"));
        }
        let user = self
            .store
            .update_details(rfid, name, email)
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error Updating User"))?;
        Ok(user.into())
    }

    #[instrument(skip(self, password))]
    pub async fn edit_password(&self, id: UserId, password: &str) -> ApiResult<()> {
        self.store
            .update_password(id, password)
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error Updating User"))?;
        Ok(())
    }

    pub async fn balance_of(&self, id: UserId) -> ApiResult<i64> {
        self.store
            .user_by_id(id)
            .await
            .map_err(|e| {
                ApiError::from_store(
                    e,
                    "Account balance not found",
                    "Error fetching account balance",
                )
            })?
            .map(|user| user.balance)
            .ok_or_else(|| ApiError::not_found("Account balance not found"))
    }

    /// Apply `delta` to the balance of `rfid`, persist it, then push the new
    /// value to every connection following that RFID.
    ///
    /// Nothing is pushed unless the store accepted the new balance.
    #[instrument(skip(self))]
    pub async fn adjust_balance(&self, rfid: &str, delta: i64) -> ApiResult<BalanceChange> {
        let user = self
            .store
            .user_by_rfid(rfid)
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error fetching user"))?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        let new_balance = user
            .balance
            .checked_add(delta)
            .ok_or_else(|| ApiError::bad_request("Balance out of range"))?;

        let updated = self
            .store
            .update_balance(rfid, new_balance)
            .await
            .map_err(|e| {
                ApiError::from_store(e, "User not found", "Error Adding Account Balance")
            })?;

        info!(
            rfid = %updated.rfid,
            previous = user.balance,
            new_balance = updated.balance,
            "Balance updated"
        );
        self.metrics.record_balance_update();

        let push = self
            .registry
            .broadcast_balance(&BalanceUpdate::new(updated.rfid.clone(), updated.balance));
        self.metrics.record_push(push.delivered, push.dropped);

        Ok(BalanceChange {
            user: updated.into(),
            previous_balance: user.balance,
            push,
        })
    }

    /// Transactions for `rfid`; an empty history is reported as not found
    pub async fn transactions(&self, rfid: &str) -> ApiResult<Vec<TransactionRecord>> {
        let rows = self.store.transactions_for(rfid).await.map_err(|e| {
            ApiError::from_store(e, "Transactions not found", "Error fetching transactions")
        })?;
        if rows.is_empty() {
            return Err(ApiError::not_found("Transactions not found"));
        }
        Ok(rows)
    }

    #[instrument(skip(self, transaction), fields(rfid = %transaction.rfid))]
    pub async fn add_transaction(
        &self,
        transaction: NewTransaction,
    ) -> ApiResult<TransactionRecord> {
        let Some(rfid) = Rfid::parse(transaction.rfid.as_str()) else {
            return Err(ApiError::bad_request("rfid is required"));
        };
        let transaction = NewTransaction {
            rfid,
            ..transaction
        };
        let record = self
            .store
            .insert_transaction(transaction)
            .await
            .map_err(|e| ApiError::from_store(e, "User not found", "Error Adding Transaction"))?;

        info!(
            id = record.id,
            transaction_type = %record.transaction_type,
            bottle_count = record.bottle_count,
            balance_modified = record.balance_modified,
            "Transaction added"
        );
        Ok(record)
    }

    /// Ask the vision classifier whether the photo shows a plastic bottle
    pub async fn classify_bottle(&self, image: &EncodedImage) -> ApiResult<bool> {
        if image.is_empty() {
            return Err(ApiError::bad_request("bottle image is required"));
        }
        let verdict = self.classifier.classify(image).await?;
        self.metrics.record_classification();
        info!(verdict, "Bottle classified");
        Ok(verdict)
    }

    pub async fn send_voucher(&self, email: &str, code: &str) -> ApiResult<()> {
        if email.trim().is_empty() || code.trim().is_empty() {
            return Err(ApiError::bad_request("email and voucher_code are required"));
        }
        info!(recipient = %email, "Sending voucher");
        self.notifier.send_voucher(email.trim(), code.trim()).await?;
        self.metrics.record_voucher();
        Ok(())
    }
}
