use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core_types::{AccountKey, IdempotencyKey, MoneyRequestId, TransactionId, UserId};
use crate::directory::{Recipient, TransferMethod};
use crate::money::Amount;

/// Only committed transfers produce a row, so this is the only status
pub const STATUS_COMPLETED: &str = "completed";

/// Fully resolved transfer, ready for the ledger
#[derive(Debug, Clone)]
pub struct TransferOrder {
    pub idempotency_key: IdempotencyKey,
    pub sender_user_id: UserId,
    pub sender_name: String,
    pub sender_account: AccountKey,
    /// Set when the sender authenticated with an IPA
    pub sender_ipa_address: Option<String>,
    pub receiver_user_id: Option<UserId>,
    pub receiver_name: Option<String>,
    pub receiver_account: AccountKey,
    pub amount: Amount,
    /// Identifier the sender used; also fixes the transfer method
    pub recipient: Recipient,
    pub currency: String,
    /// Money request flipped to accepted in the same unit
    pub settles: Option<MoneyRequestId>,
}

impl TransferOrder {
    pub fn method(&self) -> TransferMethod {
        self.recipient.method()
    }

    pub(crate) fn to_new_transaction(&self) -> NewTransaction {
        let (receiver_ipa_address, receiver_phone, receiver_card, receiver_iban) =
            match &self.recipient {
                Recipient::Ipa { address } => (Some(address.clone()), None, None, None),
                Recipient::Mobile { phone } => (None, Some(phone.clone()), None, None),
                Recipient::Card { card_number, .. } => (None, None, Some(card_number.clone()), None),
                Recipient::Iban { iban } => (None, None, None, Some(iban.clone())),
                Recipient::Account(_) => (None, None, None, None),
            };

        NewTransaction {
            idempotency_key: self.idempotency_key.as_str().to_string(),
            sender_user_id: self.sender_user_id,
            sender_name: self.sender_name.clone(),
            receiver_user_id: self.receiver_user_id,
            receiver_name: self.receiver_name.clone(),
            amount: self.amount,
            sender_account: self.sender_account.clone(),
            receiver_account: self.receiver_account.clone(),
            transfer_method: self.method(),
            sender_ipa_address: self.sender_ipa_address.clone(),
            receiver_ipa_address,
            receiver_phone,
            receiver_card,
            receiver_iban,
            status: STATUS_COMPLETED.to_string(),
            currency: self.currency.clone(),
        }
    }
}

/// Transaction row before the store assigns id and time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub idempotency_key: String,
    pub sender_user_id: UserId,
    pub sender_name: String,
    pub receiver_user_id: Option<UserId>,
    pub receiver_name: Option<String>,
    pub amount: Amount,
    pub sender_account: AccountKey,
    pub receiver_account: AccountKey,
    pub transfer_method: TransferMethod,
    pub sender_ipa_address: Option<String>,
    pub receiver_ipa_address: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_card: Option<String>,
    pub receiver_iban: Option<String>,
    pub status: String,
    pub currency: String,
}

impl NewTransaction {
    pub fn into_record(
        self,
        transaction_id: TransactionId,
        transaction_time: DateTime<Utc>,
    ) -> TransactionRecord {
        TransactionRecord {
            transaction_id,
            idempotency_key: self.idempotency_key,
            sender_user_id: self.sender_user_id,
            sender_name: self.sender_name,
            receiver_user_id: self.receiver_user_id,
            receiver_name: self.receiver_name,
            amount: self.amount,
            sender_account: self.sender_account,
            receiver_account: self.receiver_account,
            transfer_method: self.transfer_method,
            sender_ipa_address: self.sender_ipa_address,
            receiver_ipa_address: self.receiver_ipa_address,
            receiver_phone: self.receiver_phone,
            receiver_card: self.receiver_card,
            receiver_iban: self.receiver_iban,
            status: self.status,
            currency: self.currency,
            transaction_time,
        }
    }
}

/// Durable proof of a committed transfer. Names are a snapshot taken at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    #[serde(skip)]
    pub idempotency_key: String,
    pub sender_user_id: UserId,
    pub sender_name: String,
    pub receiver_user_id: Option<UserId>,
    pub receiver_name: Option<String>,
    pub amount: Amount,
    pub sender_account: AccountKey,
    pub receiver_account: AccountKey,
    pub transfer_method: TransferMethod,
    pub sender_ipa_address: Option<String>,
    pub receiver_ipa_address: Option<String>,
    pub receiver_phone: Option<String>,
    pub receiver_card: Option<String>,
    pub receiver_iban: Option<String>,
    pub status: String,
    pub currency: String,
    pub transaction_time: DateTime<Utc>,
}

/// Result of [`LedgerEngine::execute_transfer`](super::LedgerEngine::execute_transfer)
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub record: TransactionRecord,
    /// Post-transfer balances, read inside the unit; absent on replay
    pub sender_balance: Option<Amount>,
    pub receiver_balance: Option<Amount>,
    /// True when the idempotency key had already committed
    pub replayed: bool,
}
