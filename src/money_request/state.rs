//! Money Request State Definitions
//!
//! State IDs are stored as SMALLINT. `Pending` is the only non-terminal state;
//! each request leaves it exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum MoneyRequestStatus {
    /// Waiting for the requested user
    Pending = 0,

    /// Terminal: paid, `transaction_id` is set
    Accepted = 10,

    /// Terminal: refused by the requested user
    Declined = -10,

    /// Terminal: left pending past the expiry window
    Expired = -20,
}

impl MoneyRequestStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MoneyRequestStatus::Pending)
    }

    /// Only `Pending` may move, and only to a terminal state
    #[inline]
    pub fn can_transition_to(&self, next: MoneyRequestStatus) -> bool {
        *self == MoneyRequestStatus::Pending && next.is_terminal()
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(MoneyRequestStatus::Pending),
            10 => Some(MoneyRequestStatus::Accepted),
            -10 => Some(MoneyRequestStatus::Declined),
            -20 => Some(MoneyRequestStatus::Expired),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoneyRequestStatus::Pending => "pending",
            MoneyRequestStatus::Accepted => "accepted",
            MoneyRequestStatus::Declined => "declined",
            MoneyRequestStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for MoneyRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for MoneyRequestStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        MoneyRequestStatus::from_id(value).ok_or(())
    }
}
