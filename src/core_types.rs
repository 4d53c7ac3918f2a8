//! Core type definitions shared by every module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application user (`users.user_id`)
pub type UserId = i64;

/// Bank-side customer (`bank_users.bank_user_id`); distinct from [`UserId`]
pub type BankUserId = i64;

pub type BankId = i32;

/// Ledger row id, monotonic, assigned at commit
pub type TransactionId = i64;

pub type MoneyRequestId = i64;

pub type IpaId = i64;

/// Composite bank-account key `(bank_id, account_number)`
///
/// The derived `Ord` (bank id first, then account number) is the global
/// lock-acquisition order used by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub bank_id: BankId,
    pub account_number: String,
}

impl AccountKey {
    pub fn new(bank_id: BankId, account_number: impl Into<String>) -> Self {
        Self {
            bank_id,
            account_number: account_number.into(),
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bank_id, self.account_number)
    }
}

/// Maximum accepted length of a caller-supplied idempotency key
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Keys with this prefix are issued only by money request acceptance
pub const MONEY_REQUEST_KEY_PREFIX: &str = "money-request:";

/// Per-attempt token that makes a retried transfer execute at most once.
/// Keys are scoped to the sender: two users may pick the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validate a caller-supplied key
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidIdempotencyKey> {
        let key = key.into();
        let trimmed = key.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdempotencyKey("idempotency key cannot be empty"));
        }
        if trimmed.len() > MAX_IDEMPOTENCY_KEY_LEN {
            return Err(InvalidIdempotencyKey("idempotency key is too long"));
        }
        if trimmed.starts_with(MONEY_REQUEST_KEY_PREFIX) {
            return Err(InvalidIdempotencyKey("idempotency key prefix is reserved"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Server-generated key (ULID) for callers that did not supply one
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// Key used when a money request is fulfilled; one transfer per request
    pub fn for_money_request(request_id: MoneyRequestId) -> Self {
        Self(format!("{}{}", MONEY_REQUEST_KEY_PREFIX, request_id))
    }

    /// Issued by [`IdempotencyKey::for_money_request`]
    pub fn is_money_request(&self) -> bool {
        self.0.starts_with(MONEY_REQUEST_KEY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = InvalidIdempotencyKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        IdempotencyKey::new(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdempotencyKey(&'static str);

impl fmt::Display for InvalidIdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl std::error::Error for InvalidIdempotencyKey {}
