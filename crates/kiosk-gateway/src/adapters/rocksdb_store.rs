//! # RocksDB User Store
//!
//! Persistent implementation of [`UserStore`] behind the `rocksdb` feature.
//!
//! ## Column Families
//!
//! - `users` - `UserRecord` by big-endian user id
//! - `user_index` - `rfid:<tag>` / `email:<address>` -> user id
//! - `transactions` - `TransactionRecord` by `<rfid>\0<big-endian id>`
//! - `metadata` - id counters
//!
//! Writes that touch a record and its index entries go through one
//! `WriteBatch`. A process-wide write lock serialises read-modify-write
//! sequences so uniqueness checks and counters stay consistent. Calls are
//! moved onto `spawn_blocking`, where holding that lock is fine.

use crate::domain::types::{
    NewTransaction, NewUser, TransactionId, TransactionRecord, UserId, UserRecord,
};
use crate::ports::outbound::{StoreError, UserStore};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const CF_USERS: &str = "users";
pub const CF_USER_INDEX: &str = "user_index";
pub const CF_TRANSACTIONS: &str = "transactions";
pub const CF_METADATA: &str = "metadata";

/// All column families used by the store
pub const COLUMN_FAMILIES: &[&str] = &[CF_USERS, CF_USER_INDEX, CF_TRANSACTIONS, CF_METADATA];

const KEY_LAST_USER_ID: &[u8] = b"last_user_id";
const KEY_LAST_TRANSACTION_ID: &[u8] = b"last_transaction_id";

/// RocksDB tuning
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Path to the database directory
    pub path: PathBuf,
    /// Block cache size in bytes (default: 32MB)
    pub block_cache_size: usize,
    /// Write buffer size in bytes (default: 16MB)
    pub write_buffer_size: usize,
    /// Enable fsync after each write (default: true)
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/kiosk"),
            block_cache_size: 32 * 1024 * 1024,
            write_buffer_size: 16 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Create config for testing (smaller buffers, no sync)
    pub fn for_testing(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            block_cache_size: 1024 * 1024,
            write_buffer_size: 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// RocksDB-backed [`UserStore`]
///
/// Every call runs on tokio's blocking pool, so disk I/O and the write lock
/// never stall a runtime worker.
pub struct RocksDbUserStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db: DB,
    config: RocksDbConfig,
    write_lock: Mutex<()>,
}

impl RocksDbUserStore {
    /// Open or create the database
    pub fn open(config: RocksDbConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| StoreError::Backend(format!("Failed to open RocksDB: {}", e)))?;

        info!(path = %config.path.display(), "Opened RocksDB user store");

        Ok(Self {
            inner: Arc::new(StoreInner {
                db,
                config,
                write_lock: Mutex::new(()),
            }),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&StoreInner) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {}", e)))?
    }
}

impl StoreInner {
    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {}", name)))
    }

    fn get_value<T: DeserializeOwned>(
        &self,
        cf: &str,
        key: &[u8],
    ) -> Result<Option<T>, StoreError> {
        let bytes = self
            .db
            .get_cf(self.cf(cf)?, key)
            .map_err(|e| StoreError::Backend(format!("RocksDB get failed: {}", e)))?;
        bytes.map(|b| decode(&b)).transpose()
    }

    fn indexed_id(&self, key: &[u8]) -> Result<Option<UserId>, StoreError> {
        self.get_value(CF_USER_INDEX, key)
    }

    fn user_for_index(&self, key: &[u8]) -> Result<Option<UserRecord>, StoreError> {
        match self.indexed_id(key)? {
            Some(id) => self.get_value(CF_USERS, &id.to_be_bytes()),
            None => Ok(None),
        }
    }

    fn require_rfid(&self, rfid: &str) -> Result<UserRecord, StoreError> {
        self.user_for_index(&rfid_key(rfid))?
            .ok_or_else(|| StoreError::UserNotFound(rfid.to_string()))
    }

    fn next_id(&self, batch: &mut WriteBatch, counter: &[u8]) -> Result<i64, StoreError> {
        let last: i64 = self.get_value(CF_METADATA, counter)?.unwrap_or(0);
        let next = last + 1;
        batch.put_cf(self.cf(CF_METADATA)?, counter, encode(&next)?);
        Ok(next)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .map_err(|e| StoreError::Backend(format!("RocksDB batch write failed: {}", e)))
    }

    fn put_user(&self, batch: &mut WriteBatch, user: &UserRecord) -> Result<(), StoreError> {
        batch.put_cf(self.cf(CF_USERS)?, user.id.to_be_bytes(), encode(user)?);
        Ok(())
    }
}

fn rfid_key(rfid: &str) -> Vec<u8> {
    format!("rfid:{}", rfid).into_bytes()
}

fn email_key(email: &str) -> Vec<u8> {
    format!("email:{}", email).into_bytes()
}

fn transaction_prefix(rfid: &str) -> Vec<u8> {
    let mut key = rfid.as_bytes().to_vec();
    key.push(0);
    key
}

fn transaction_key(rfid: &str, id: TransactionId) -> Vec<u8> {
    let mut key = transaction_prefix(rfid);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl StoreInner {
    fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users = Vec::new();
        for item in self.db.iterator_cf(self.cf(CF_USERS)?, IteratorMode::Start) {
            let (_, value) =
                item.map_err(|e| StoreError::Backend(format!("RocksDB scan failed: {}", e)))?;
            users.push(decode(&value)?);
        }
        Ok(users)
    }

    fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let _guard = self.write_lock.lock();

        if self.indexed_id(&rfid_key(user.rfid.as_str()))?.is_some() {
            return Err(StoreError::Duplicate {
                field: "rfid",
                value: user.rfid.into_inner(),
            });
        }
        if self.indexed_id(&email_key(&user.email))?.is_some() {
            return Err(StoreError::Duplicate {
                field: "email",
                value: user.email,
            });
        }

        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, KEY_LAST_USER_ID)?;
        let record = UserRecord {
            id,
            rfid: user.rfid,
            name: user.name,
            email: user.email,
            password: user.password,
            balance: user.balance,
            permission: user.permission,
        };

        let index = self.cf(CF_USER_INDEX)?;
        batch.put_cf(index, rfid_key(record.rfid.as_str()), encode(&id)?);
        batch.put_cf(index, email_key(&record.email), encode(&id)?);
        self.put_user(&mut batch, &record)?;
        self.write(batch)?;
        Ok(record)
    }

    fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.get_value(CF_USERS, &id.to_be_bytes())
    }

    fn user_by_rfid(&self, rfid: &str) -> Result<Option<UserRecord>, StoreError> {
        self.user_for_index(&rfid_key(rfid))
    }

    fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        self.user_for_index(&email_key(email))
    }

    fn update_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let mut user = self.require_rfid(rfid)?;

        if let Some(owner) = self.indexed_id(&email_key(email))? {
            if owner != user.id {
                return Err(StoreError::Duplicate {
                    field: "email",
                    value: email.to_string(),
                });
            }
        }

        let mut batch = WriteBatch::default();
        let index = self.cf(CF_USER_INDEX)?;
        batch.delete_cf(index, email_key(&user.email));
        batch.put_cf(index, email_key(email), encode(&user.id)?);

        user.name = name.to_string();
        user.email = email.to_string();
        self.put_user(&mut batch, &user)?;
        self.write(batch)?;
        Ok(user)
    }

    fn update_password(&self, id: UserId, password: &str) -> Result<UserRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let mut user: UserRecord = self
            .get_value(CF_USERS, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::UserNotFound(id.to_string()))?;

        user.password = password.to_string();
        let mut batch = WriteBatch::default();
        self.put_user(&mut batch, &user)?;
        self.write(batch)?;
        Ok(user)
    }

    fn update_balance(
        &self,
        rfid: &str,
        new_balance: i64,
    ) -> Result<UserRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let mut user = self.require_rfid(rfid)?;

        user.balance = new_balance;
        let mut batch = WriteBatch::default();
        self.put_user(&mut batch, &user)?;
        self.write(batch)?;
        Ok(user)
    }

    fn transactions_for(&self, rfid: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let prefix = transaction_prefix(rfid);
        let mut results = Vec::new();

        let iter = self.db.iterator_cf(
            self.cf(CF_TRANSACTIONS)?,
            IteratorMode::From(&prefix, Direction::Forward),
        );
        for item in iter {
            let (key, value) =
                item.map_err(|e| StoreError::Backend(format!("RocksDB scan failed: {}", e)))?;
            if !key.starts_with(&prefix) {
                break;
            }
            results.push(decode(&value)?);
        }
        Ok(results)
    }

    fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        let _guard = self.write_lock.lock();
        let mut batch = WriteBatch::default();
        let id = self.next_id(&mut batch, KEY_LAST_TRANSACTION_ID)?;

        let record = TransactionRecord {
            id,
            rfid: transaction.rfid,
            transaction_date: transaction.transaction_date.unwrap_or_else(Utc::now),
            transaction_type: transaction.transaction_type,
            bottle_count: transaction.bottle_count,
            balance_modified: transaction.balance_modified,
        };

        batch.put_cf(
            self.cf(CF_TRANSACTIONS)?,
            transaction_key(record.rfid.as_str(), id),
            encode(&record)?,
        );
        self.write(batch)?;
        Ok(record)
    }
}

#[async_trait]
impl UserStore for RocksDbUserStore {
    async fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        self.blocking(|store| store.list_users()).await
    }

    async fn insert_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        self.blocking(move |store| store.insert_user(user)).await
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        self.blocking(move |store| store.user_by_id(id)).await
    }

    async fn user_by_rfid(&self, rfid: &str) -> Result<Option<UserRecord>, StoreError> {
        let rfid = rfid.to_string();
        self.blocking(move |store| store.user_by_rfid(&rfid)).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let email = email.to_string();
        self.blocking(move |store| store.user_by_email(&email)).await
    }

    async fn update_details(
        &self,
        rfid: &str,
        name: &str,
        email: &str,
    ) -> Result<UserRecord, StoreError> {
        let (rfid, name, email) = (rfid.to_string(), name.to_string(), email.to_string());
        self.blocking(move |store| store.update_details(&rfid, &name, &email))
            .await
    }

    async fn update_password(&self, id: UserId, password: &str) -> Result<UserRecord, StoreError> {
        let password = password.to_string();
        self.blocking(move |store| store.update_password(id, &password))
            .await
    }

    async fn update_balance(
        &self,
        rfid: &str,
        new_balance: i64,
    ) -> Result<UserRecord, StoreError> {
        let rfid = rfid.to_string();
        self.blocking(move |store| store.update_balance(&rfid, new_balance))
            .await
    }

    async fn transactions_for(&self, rfid: &str) -> Result<Vec<TransactionRecord>, StoreError> {
        let rfid = rfid.to_string();
        self.blocking(move |store| store.transactions_for(&rfid))
            .await
    }

    async fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> Result<TransactionRecord, StoreError> {
        self.blocking(move |store| store.insert_transaction(transaction))
            .await
    }
}
