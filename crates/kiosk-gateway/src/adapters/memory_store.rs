//! In-memory user store.
//!
//! Default backend and the one tests run against. All tables live behind a
//! single `RwLock` so every operation sees a consistent set of indexes.

use crate::domain::types::{
    NewTransaction, NewUser, Rfid, TransactionId, TransactionRecord, UserId, UserRecord,
};
use crate::ports::outbound::{StoreError, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, UserRecord>,
    by_rfid: HashMap<Rfid, UserId>,
    by_email: HashMap<String, UserId>,
    transactions: Vec<TransactionRecord>,
    last_user_id: UserId,
    last_transaction_id: TransactionId,
}

impl Tables {
    fn id_for_rfid(&self, rfid: &str) -> Result<UserId, StoreError> {
        self.by_rfid
            .get(rfid)
            .copied()
            .ok_or_else(|| StoreError::UserNotFound(rfid.to_string()))
    }

    fn user_mut(&mut self, id: UserId) -> Result<&mut UserRecord, StoreError> {
        self.users
            .get_mut(&id)
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))
    }
}

/// Process-local [`UserStore`]
#[derive(Default)]
pub struct InMemoryUserStore {
    tables: RwLock<Tables>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `users`, in order
    pub fn with_users(users: impl IntoIterator<Item = NewUser>) -> Result<Self, StoreError> {
        let store = Self::new();
        for user in users {
            store.insert_user_sync(user)?;
        }
        Ok(store)
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }

    fn insert_user_sync(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();

        if tables.by_rfid.contains_key(&user.rfid) {
            return Err(StoreError::Duplicate {
                field: "rfid",
                value: user.rfid.into_inner(),
            });
        }
        if tables.by_email.contains_key(&user.email) {
            return Err(StoreError::Duplicate {
                field: "email",
                value: user.email,
            });
        }

        tables.last_user_id += 1;
        let record = UserRecord {
            id: tables.last_user_id,
            rfid: user.rfid,
            name: user.name,
            email: user.email,
            password: user.password,
            balance: user.balance,
            permission: user.permission,
        };

        tables.by_rfid.insert(record.rfid.clone(), record.id);
        tables.by_email.insert(record.email.clone(), record.id);
        tables.users.insert(record.id, record.clone());
        Ok(record)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        Ok(self.tables.read().users.values().cloned().collect())
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        self.insert_user_sync(user)
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn user_by_rfid(&self, rfid: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .by_rfid
            .get(rfid)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables
            .by_email
            .get(email)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn update_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let id = tables.id_for_rfid(rfid)?;

        if let Some(owner) = tables.by_email.get(email) {
            if *owner != id {
                return Err(StoreError::Duplicate {
                    field: "email",
                    value: email.to_string(),
                });
            }
        }

        let user = tables.user_mut(id)?;
        let old_email = std::mem::replace(&mut user.email, email.to_string());
        user.name = name.to_string();
        let updated = user.clone();

        tables.by_email.remove(&old_email);
        tables.by_email.insert(email.to_string(), id);
        Ok(updated)
    }

    async fn update_password(&self, id: UserId, password: &str) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let user = tables.user_mut(id)?;
        user.password = password.to_string();
        Ok(user.clone())
    }

    async fn update_balance(
        &self,
        rfid: &str,
        new_balance: i64,
    ) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write();
        let id = tables.id_for_rfid(rfid)?;
        let user = tables.user_mut(id)?;
        user.balance = new_balance;
        Ok(user.clone())
    }

    async fn transactions_for(&self, rfid: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .transactions
            .iter()
            .filter(|tx| tx.rfid.as_str() == rfid)
            .cloned()
            .collect())
    }

    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let mut tables = self.tables.write();
        tables.last_transaction_id += 1;

        let record = TransactionRecord {
            id: tables.last_transaction_id,
            rfid: transaction.rfid,
            transaction_date: transaction.transaction_date.unwrap_or_else(Utc::now),
            transaction_type: transaction.transaction_type,
            bottle_count: transaction.bottle_count,
            balance_modified: transaction.balance_modified,
        };
        tables.transactions.push(record.clone());
        Ok(record)
    }
}
