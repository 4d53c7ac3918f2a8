//! Transfer Error Types
//!
//! Every failure the core can return, with a stable machine code and a
//! suggested HTTP status for the routing layer.

use serde::Serialize;
use thiserror::Error;

use crate::core_types::{AccountKey, MoneyRequestId};
use crate::money::{Amount, MoneyError};

/// Default text when transactions are blocked without an admin message
pub const DEFAULT_BLOCK_MESSAGE: &str =
    "Transactions are temporarily disabled. Please try again later.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Validation Errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Cannot transfer to the same account")]
    SelfTransfer,

    // === Policy Errors ===
    #[error("{message}")]
    TransactionsBlocked { message: String },

    #[error("Transfer amount exceeds the maximum limit of {limit}")]
    TransferLimitExceeded { limit: Amount },

    // === Authentication Errors ===
    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    // === Lookup Errors ===
    #[error("Recipient not found: {0}")]
    RecipientNotFound(String),

    #[error("Sender account not found: {0}")]
    SenderAccountNotFound(String),

    #[error("Money request not found: {0}")]
    MoneyRequestNotFound(MoneyRequestId),

    // === Ledger Errors ===
    #[error("Account is inactive: {0}")]
    AccountInactive(AccountKey),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Invalid state: request is {current}")]
    InvalidState { current: String },

    // === System Errors ===
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Internal system error: {0}")]
    System(String),
}

/// Coarse classification used by callers that only care about the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ValidationError,
    PolicyRejected,
    AuthenticationError,
    RecipientNotFound,
    InsufficientFunds,
    SelfTransfer,
    ConcurrencyConflict,
    SystemError,
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::InvalidAmount => "INVALID_AMOUNT",
            TransferError::SelfTransfer => "SELF_TRANSFER",
            TransferError::TransactionsBlocked { .. } => "TRANSACTIONS_BLOCKED",
            TransferError::TransferLimitExceeded { .. } => "TRANSFER_LIMIT_EXCEEDED",
            TransferError::InvalidPin => "INVALID_PIN",
            TransferError::Forbidden(_) => "FORBIDDEN",
            TransferError::RecipientNotFound(_) => "RECIPIENT_NOT_FOUND",
            TransferError::SenderAccountNotFound(_) => "SENDER_ACCOUNT_NOT_FOUND",
            TransferError::MoneyRequestNotFound(_) => "MONEY_REQUEST_NOT_FOUND",
            TransferError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            TransferError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            TransferError::InvalidState { .. } => "INVALID_STATE",
            TransferError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            TransferError::System(_) => "SYSTEM_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::Validation(_)
            | TransferError::InvalidAmount
            | TransferError::SelfTransfer
            | TransferError::TransferLimitExceeded { .. }
            | TransferError::InsufficientFunds => 400,
            TransferError::InvalidPin => 401,
            TransferError::TransactionsBlocked { .. } | TransferError::Forbidden(_) => 403,
            TransferError::RecipientNotFound(_)
            | TransferError::SenderAccountNotFound(_)
            | TransferError::MoneyRequestNotFound(_) => 404,
            TransferError::InvalidState { .. } | TransferError::ConcurrencyConflict(_) => 409,
            TransferError::AccountInactive(_) => 422,
            TransferError::System(_) => 500,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            TransferError::Validation(_)
            | TransferError::InvalidAmount
            | TransferError::AccountInactive(_)
            | TransferError::InvalidState { .. }
            | TransferError::MoneyRequestNotFound(_)
            | TransferError::SenderAccountNotFound(_) => ErrorCategory::ValidationError,
            TransferError::TransactionsBlocked { .. }
            | TransferError::TransferLimitExceeded { .. } => ErrorCategory::PolicyRejected,
            TransferError::InvalidPin | TransferError::Forbidden(_) => {
                ErrorCategory::AuthenticationError
            }
            TransferError::RecipientNotFound(_) => ErrorCategory::RecipientNotFound,
            TransferError::InsufficientFunds => ErrorCategory::InsufficientFunds,
            TransferError::SelfTransfer => ErrorCategory::SelfTransfer,
            TransferError::ConcurrencyConflict(_) => ErrorCategory::ConcurrencyConflict,
            TransferError::System(_) => ErrorCategory::SystemError,
        }
    }

    /// Only conflicts are worth an automatic retry (with the same idempotency key)
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::ConcurrencyConflict(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            limit: match self {
                TransferError::TransferLimitExceeded { limit } => Some(*limit),
                _ => None,
            },
        }
    }
}

/// Wire shape of an error for the HTTP layer
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<Amount>,
}

/// SQLSTATEs that mean "try again": deadlock, serialization failure, lock not available
const RETRYABLE_SQLSTATES: [&str; 3] = ["40P01", "40001", "55P03"];

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && let Some(code) = db.code()
            && RETRYABLE_SQLSTATES.contains(&&*code)
        {
            return TransferError::ConcurrencyConflict(db.message().to_string());
        }
        if matches!(e, sqlx::Error::PoolTimedOut) {
            return TransferError::ConcurrencyConflict("connection pool exhausted".into());
        }
        TransferError::System(e.to_string())
    }
}

/// True when the error is a UNIQUE constraint violation (SQLSTATE 23505)
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().is_some_and(|c| c == "23505"),
        _ => false,
    }
}

impl From<MoneyError> for TransferError {
    fn from(e: MoneyError) -> Self {
        match e {
            MoneyError::Negative => TransferError::InvalidAmount,
            MoneyError::Overflow => TransferError::System(e.to_string()),
            other => TransferError::Validation(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for TransferError {
    fn from(e: anyhow::Error) -> Self {
        TransferError::System(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SelfTransfer.code(), "SELF_TRANSFER");
        assert_eq!(TransferError::InsufficientFunds.code(), "INSUFFICIENT_FUNDS");
        assert_eq!(
            TransferError::TransactionsBlocked {
                message: "x".into()
            }
            .code(),
            "TRANSACTIONS_BLOCKED"
        );
        assert_eq!(
            TransferError::TransferLimitExceeded {
                limit: Amount::from_units(5000)
            }
            .code(),
            "TRANSFER_LIMIT_EXCEEDED"
        );
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidPin.http_status(), 401);
        assert_eq!(
            TransferError::TransactionsBlocked {
                message: DEFAULT_BLOCK_MESSAGE.into()
            }
            .http_status(),
            403
        );
        assert_eq!(TransferError::RecipientNotFound("x".into()).http_status(), 404);
        assert_eq!(TransferError::System("db".into()).http_status(), 500);
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(TransferError::ConcurrencyConflict("deadlock".into()).is_retryable());
        assert!(!TransferError::InsufficientFunds.is_retryable());
        assert!(!TransferError::System("x".into()).is_retryable());
    }

    #[test]
    fn test_category() {
        assert_eq!(
            TransferError::InvalidPin.category(),
            ErrorCategory::AuthenticationError
        );
        assert_eq!(
            TransferError::TransferLimitExceeded {
                limit: Amount::ZERO
            }
            .category(),
            ErrorCategory::PolicyRejected
        );
    }

    #[test]
    fn test_body_carries_limit() {
        let body = TransferError::TransferLimitExceeded {
            limit: Amount::from_units(5000),
        }
        .to_body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "TRANSFER_LIMIT_EXCEEDED");
        assert_eq!(json["limit"], "5000.00");
        assert_eq!(
            body.message,
            "Transfer amount exceeds the maximum limit of 5000.00"
        );

        let json = serde_json::to_value(TransferError::InvalidPin.to_body()).unwrap();
        assert!(json.get("limit").is_none());
    }

    #[test]
    fn test_money_error_mapping() {
        assert_eq!(
            TransferError::from(MoneyError::Negative),
            TransferError::InvalidAmount
        );
        assert_eq!(
            TransferError::from(MoneyError::InvalidFormat("bad".into())).code(),
            "VALIDATION_ERROR"
        );
    }
}
