//! Addressing schemes for transfers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core_types::{AccountKey, BankId};
use crate::error::TransferError;

/// How the sender addressed the receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    Ipa,
    Mobile,
    Card,
    Account,
    Iban,
}

impl TransferMethod {
    pub const ALL: [TransferMethod; 5] = [
        TransferMethod::Ipa,
        TransferMethod::Mobile,
        TransferMethod::Card,
        TransferMethod::Account,
        TransferMethod::Iban,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferMethod::Ipa => "ipa",
            TransferMethod::Mobile => "mobile",
            TransferMethod::Card => "card",
            TransferMethod::Account => "account",
            TransferMethod::Iban => "iban",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s)
    }
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver identifier, one variant per [`TransferMethod`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transfer_method", rename_all = "lowercase")]
pub enum Recipient {
    Ipa { address: String },
    Mobile { phone: String },
    Card { bank_id: BankId, card_number: String },
    Account(AccountKey),
    Iban { iban: String },
}

impl Recipient {
    pub fn method(&self) -> TransferMethod {
        match self {
            Recipient::Ipa { .. } => TransferMethod::Ipa,
            Recipient::Mobile { .. } => TransferMethod::Mobile,
            Recipient::Card { .. } => TransferMethod::Card,
            Recipient::Account(_) => TransferMethod::Account,
            Recipient::Iban { .. } => TransferMethod::Iban,
        }
    }

    /// Reject blank identifiers before any lookup
    pub fn validate(&self) -> Result<(), TransferError> {
        let blank = match self {
            Recipient::Ipa { address } => address.trim().is_empty(),
            Recipient::Mobile { phone } => phone.trim().is_empty(),
            Recipient::Card { card_number, .. } => card_number.trim().is_empty(),
            Recipient::Account(key) => key.account_number.trim().is_empty(),
            Recipient::Iban { iban } => iban.trim().is_empty(),
        };
        if blank {
            return Err(TransferError::Validation(format!(
                "missing recipient identifier for method {}",
                self.method()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recipient::Ipa { address } => write!(f, "ipa {}", address),
            Recipient::Mobile { phone } => write!(f, "mobile {}", phone),
            Recipient::Card {
                bank_id,
                card_number,
            } => write!(f, "card {}/{}", bank_id, card_number),
            Recipient::Account(key) => write!(f, "account {}", key),
            Recipient::Iban { iban } => write!(f, "iban {}", iban),
        }
    }
}

/// Which of the sender's own accounts pays for a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FundingSource {
    Ipa { address: String },
    Account(AccountKey),
    Card { bank_id: BankId, card_number: String },
}
