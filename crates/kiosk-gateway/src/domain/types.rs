//! Core types for the kiosk gateway.
//!
//! Field names follow the wire format the kiosk frontend already speaks
//! (snake_case columns, `newBalance` in push payloads).

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Database id of a user row
pub type UserId = i64;

/// Database id of a transaction row
pub type TransactionId = i64;

/// RFID tag value identifying a kiosk user.
///
/// This is also the subscriber identity of the push channel: every live
/// connection that announced the same tag receives that user's balance events.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rfid(String);

impl Rfid {
    /// Maximum accepted tag length in bytes
    pub const MAX_LEN: usize = 128;

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Parse an announced tag, trimming whitespace.
    ///
    /// Returns `None` for empty or oversized values.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > Self::MAX_LEN {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Rfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Rfid {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Rfid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Rfid {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Rfid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A stored user row.
///
/// Holds the password as submitted; use [`UserProfile`] for anything leaving
/// the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub rfid: Rfid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub balance: i64,
    pub permission: String,
}

/// Public view of a user, as returned by the REST API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub rfid: Rfid,
    pub name: String,
    pub email: String,
    pub balance: i64,
    pub permission: String,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            rfid: user.rfid.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            balance: user.balance,
            permission: user.permission.clone(),
        }
    }
}

impl From<UserRecord> for UserProfile {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            rfid: user.rfid,
            name: user.name,
            email: user.email,
            balance: user.balance,
            permission: user.permission,
        }
    }
}

/// Fields for creating a user
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    pub rfid: Rfid,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub balance: i64,
    #[serde(default)]
    pub permission: String,
}

/// A stored deposit/redemption record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub rfid: Rfid,
    pub transaction_date: DateTime<Utc>,
    pub transaction_type: String,
    pub bottle_count: i32,
    pub balance_modified: i64,
}

/// Fields for recording a transaction.
///
/// `transaction_date` defaults to the time the record is stored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTransaction {
    pub rfid: Rfid,
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
    pub transaction_type: String,
    #[serde(default)]
    pub bottle_count: i32,
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub balance_modified: i64,
}

/// Payload of the `balanceUpdate` push event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub rfid: Rfid,
    #[serde(rename = "newBalance")]
    pub new_balance: i64,
}

impl BalanceUpdate {
    pub fn new(rfid: Rfid, new_balance: i64) -> Self {
        Self { rfid, new_balance }
    }
}

/// Base64-encoded JPEG captured by the kiosk camera.
///
/// Kept encoded end to end; the vision API takes it as a data URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct EncodedImage(String);

impl EncodedImage {
    pub fn new(base64: impl Into<String>) -> Self {
        Self(base64.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// `data:` URL form accepted by the vision API
    pub fn to_data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.0.trim())
    }
}

/// Deserialize an integer amount sent either as a JSON number or as a
/// numeric string (`10`, `"10"`, `"-5"`).
///
/// Fractional parts are truncated toward zero, matching how the kiosk
/// frontend has always had amounts parsed.
pub fn deserialize_amount<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Int(v) => Ok(v),
        Amount::Float(v) if v.is_finite() && v.abs() < i64::MAX as f64 => Ok(v.trunc() as i64),
        Amount::Float(v) => Err(de::Error::custom(format!("amount out of range: {}", v))),
        Amount::Text(s) => parse_amount_str(&s)
            .ok_or_else(|| de::Error::custom(format!("invalid amount: {:?}", s))),
    }
}

/// Parse the leading integer of a string, ignoring a fractional tail
fn parse_amount_str(s: &str) -> Option<i64> {
    let s = s.trim();
    let integral = match s.find('.') {
        Some(idx) => &s[..idx],
        None => s,
    };
    match integral {
        "" | "-" | "+" => None,
        digits => digits.parse().ok(),
    }
}
