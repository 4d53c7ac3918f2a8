//! Repository seams
//!
//! The core only talks to these traits. [`PgStore`](postgres::PgStore) backs
//! them with PostgreSQL; [`MemoryStore`](memory::MemoryStore) keeps everything
//! in process for tests and embedding.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::core_types::{
    AccountKey, BankId, BankUserId, IdempotencyKey, IpaId, MoneyRequestId, TransactionId, UserId,
};
use crate::credentials::AuthContext;
use crate::error::TransferError;
use crate::ledger::{NewTransaction, TransactionRecord};
use crate::models::{BankAccount, Card, InstantPaymentAddress, PinHash, UserProfile};
use crate::money::Amount;
use crate::money_request::{MoneyRequest, MoneyRequestStatus, NewMoneyRequest};
use crate::policy::{SettingsPatch, SystemSettings};

/// Read-only lookups for recipient and funding resolution.
///
/// Every list is ordered by creation, oldest first.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn account(&self, key: &AccountKey) -> Result<Option<BankAccount>, TransferError>;

    async fn account_by_iban(&self, iban: &str) -> Result<Option<BankAccount>, TransferError>;

    /// Accounts of one bank customer at one bank
    async fn accounts_for_bank_user(
        &self,
        bank_user_id: BankUserId,
        bank_id: BankId,
    ) -> Result<Vec<BankAccount>, TransferError>;

    async fn ipa_by_address(
        &self,
        address: &str,
    ) -> Result<Option<InstantPaymentAddress>, TransferError>;

    async fn ipa_by_id(&self, ipa_id: IpaId)
    -> Result<Option<InstantPaymentAddress>, TransferError>;

    async fn ipas_for_account(
        &self,
        key: &AccountKey,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError>;

    async fn ipas_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError>;

    async fn user(&self, user_id: UserId) -> Result<Option<UserProfile>, TransferError>;

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, TransferError>;

    async fn card(&self, bank_id: BankId, card_number: &str)
    -> Result<Option<Card>, TransferError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stored hash for the context, `None` if the context or its PIN is unknown
    async fn pin_hash(&self, ctx: &AuthContext) -> Result<Option<PinHash>, TransferError>;
}

/// The singleton settings row
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<Option<SystemSettings>, TransferError>;

    /// Create the row if it is still missing and return whatever is stored
    async fn insert_defaults(
        &self,
        defaults: &SystemSettings,
    ) -> Result<SystemSettings, TransferError>;

    /// Patch the row and stamp `updated_at` / `updated_by`
    async fn update(
        &self,
        patch: &SettingsPatch,
        updated_by: Option<UserId>,
    ) -> Result<SystemSettings, TransferError>;
}

/// Entry point of the ledger: opens atomic units, serves history
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open an atomic unit. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, TransferError>;

    /// Keys are unique per sender, not globally
    async fn transaction_by_key(
        &self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    /// Sent and received, newest first
    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError>;
}

/// One atomic unit of balance mutation
#[async_trait]
pub trait LedgerTx: Send {
    /// Write-locking read; blocks concurrent units on the same account
    async fn lock_account(&mut self, key: &AccountKey)
    -> Result<Option<BankAccount>, TransferError>;

    /// Subtract `amount` if the account is active and covers it; returns the new balance
    async fn debit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError>;

    /// Add `amount` to an active account; returns the new balance
    async fn credit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError>;

    async fn transaction_by_key(
        &mut self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError>;

    /// Assigns `transaction_id` and `transaction_time`
    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<TransactionRecord, TransferError>;

    /// `pending -> accepted` with the transaction id; false if no longer pending
    async fn settle_money_request(
        &mut self,
        request_id: MoneyRequestId,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError>;

    async fn commit(self: Box<Self>) -> Result<(), TransferError>;

    async fn rollback(self: Box<Self>) -> Result<(), TransferError>;
}

#[async_trait]
pub trait MoneyRequestStore: Send + Sync {
    async fn insert(&self, request: &NewMoneyRequest) -> Result<MoneyRequest, TransferError>;

    async fn get(&self, request_id: MoneyRequestId)
    -> Result<Option<MoneyRequest>, TransferError>;

    /// Pending requests addressed to the user, newest first
    async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError>;

    /// Sent and received, newest first
    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError>;

    /// CAS on status; false if the request was not in `from`.
    /// Acceptance goes through [`LedgerTx::settle_money_request`] instead.
    async fn transition(
        &self,
        request_id: MoneyRequestId,
        from: MoneyRequestStatus,
        to: MoneyRequestStatus,
    ) -> Result<bool, TransferError>;

    /// Flip every request still pending and created before `cutoff` to expired;
    /// returns the requests that were flipped
    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MoneyRequest>, TransferError>;
}

/// Everything the core needs, as trait objects
#[derive(Clone)]
pub struct Stores {
    pub directory: Arc<dyn DirectoryStore>,
    pub credentials: Arc<dyn CredentialStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub requests: Arc<dyn MoneyRequestStore>,
}

impl Stores {
    /// One backend serving every seam
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: DirectoryStore
            + CredentialStore
            + SettingsStore
            + LedgerStore
            + MoneyRequestStore
            + 'static,
    {
        Self {
            directory: store.clone(),
            credentials: store.clone(),
            settings: store.clone(),
            ledger: store.clone(),
            requests: store,
        }
    }
}
