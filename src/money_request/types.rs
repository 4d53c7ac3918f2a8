use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::MoneyRequestStatus;
use crate::core_types::{MoneyRequestId, TransactionId, UserId};
use crate::money::Amount;

/// Longest accepted request note
pub const MAX_MESSAGE_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyRequest {
    pub request_id: MoneyRequestId,
    pub requester_user_id: UserId,
    pub requester_name: String,
    pub requested_user_id: UserId,
    pub requested_name: String,
    pub amount: Amount,
    /// Where the money goes on acceptance
    pub requester_ipa_address: String,
    pub requested_ipa_address: String,
    pub message: Option<String>,
    pub status: MoneyRequestStatus,
    /// Set if and only if `status == Accepted`
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row to insert; the store assigns id, status and timestamps
#[derive(Debug, Clone)]
pub struct NewMoneyRequest {
    pub requester_user_id: UserId,
    pub requester_name: String,
    pub requested_user_id: UserId,
    pub requested_name: String,
    pub amount: Amount,
    pub requester_ipa_address: String,
    pub requested_ipa_address: String,
    pub message: Option<String>,
}

/// Inbound create call
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMoneyRequest {
    pub requested_ipa_address: String,
    pub amount: Amount,
    #[serde(default)]
    pub message: Option<String>,
}

/// What happened to a request, for the requester's notification feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoneyRequestAction {
    Created,
    Accepted,
    Declined,
    Expired,
}

impl MoneyRequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoneyRequestAction::Created => "created",
            MoneyRequestAction::Accepted => "accepted",
            MoneyRequestAction::Declined => "declined",
            MoneyRequestAction::Expired => "expired",
        }
    }
}

/// Notification payload for a request lifecycle step
#[derive(Debug, Clone, Serialize)]
pub struct MoneyRequestEvent {
    /// User to notify
    pub to: UserId,
    pub action: MoneyRequestAction,
    pub request: MoneyRequest,
}
