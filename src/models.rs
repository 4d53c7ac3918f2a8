//! Persistent entities read by the transfer core.
//!
//! These are snapshots of rows; balances in particular are only ever mutated by
//! the ledger inside an atomic unit, never through these structs.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{AccountKey, BankId, BankUserId, IpaId, UserId};
use crate::money::Amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AccountStatus::Active),
            "inactive" => Some(AccountStatus::Inactive),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub key: AccountKey,
    pub bank_user_id: BankUserId,
    pub iban: String,
    pub status: AccountStatus,
    /// Free-form, e.g. "current" or "savings"
    pub account_type: String,
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
}

impl BankAccount {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// One-way PIN hash (PHC string). Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct PinHash(String);

impl PinHash {
    pub fn new(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PinHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PinHash(<redacted>)")
    }
}

/// Instant Payment Address: a human-readable alias for one bank account
#[derive(Debug, Clone)]
pub struct InstantPaymentAddress {
    pub ipa_id: IpaId,
    pub ipa_address: String,
    pub key: AccountKey,
    pub user_id: UserId,
    pub pin_hash: PinHash,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Debit,
    Prepaid,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Debit => "debit",
            CardType::Prepaid => "prepaid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debit" => Some(CardType::Debit),
            "prepaid" => Some(CardType::Prepaid),
            _ => None,
        }
    }
}

/// Alternate addressing / authentication path; holds no balance
#[derive(Debug, Clone)]
pub struct Card {
    pub bank_id: BankId,
    pub card_number: String,
    pub bank_user_id: BankUserId,
    pub expiration_date: NaiveDate,
    pub pin_hash: Option<PinHash>,
    pub card_type: CardType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    /// `ipa_id` of the user's default receiving address
    pub default_account: Option<IpaId>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
