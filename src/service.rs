//! Payment Core
//!
//! The surface the HTTP layer talks to. It wires the directory, policy gate,
//! PIN verifier, ledger and money request workflow over one set of stores and
//! exposes every operation as a typed call. The caller supplies an already
//! authenticated user id.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::TransferConfig;
use crate::core_types::{AccountKey, MoneyRequestId, TransactionId, UserId};
use crate::credentials::{CredentialVerifier, HashedPinVerifier, Pin};
use crate::directory::{AccountDirectory, Recipient};
use crate::error::TransferError;
use crate::ledger::{LedgerEngine, TransactionRecord};
use crate::money_request::{CreateMoneyRequest, MoneyRequest, MoneyRequestWorkflow};
use crate::notify::NotificationDispatcher;
use crate::policy::{PolicyGate, PublicStatus, SettingsPatch, SystemSettings};
use crate::store::{LedgerStore, Stores};
use crate::transfer::{SendMoney, TransferPipeline, TransferReceipt, TransferService};

/// History page size when the caller asks for none or too many
pub const MAX_HISTORY: i64 = 100;

pub struct PaymentCore {
    directory: Arc<AccountDirectory>,
    policy: Arc<PolicyGate>,
    ledger: Arc<dyn LedgerStore>,
    transfers: TransferService,
    requests: Arc<MoneyRequestWorkflow>,
}

impl PaymentCore {
    pub fn new(
        stores: Stores,
        verifier: Arc<dyn CredentialVerifier>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: &TransferConfig,
    ) -> Self {
        let directory = Arc::new(AccountDirectory::new(stores.directory.clone()));
        let policy = Arc::new(PolicyGate::new(
            stores.settings.clone(),
            config.settings_cache_ttl_secs,
        ));
        let engine = Arc::new(LedgerEngine::new(stores.ledger.clone()));
        let pipeline = Arc::new(TransferPipeline::new(
            directory.clone(),
            policy.clone(),
            verifier,
            engine,
            notifier.clone(),
            config.currency.clone(),
        ));
        let requests = Arc::new(MoneyRequestWorkflow::new(
            stores.requests.clone(),
            directory.clone(),
            pipeline.clone(),
            notifier,
        ));

        Self {
            directory,
            policy,
            ledger: stores.ledger,
            transfers: TransferService::new(pipeline),
            requests,
        }
    }

    /// PINs checked against the argon2 hashes in `stores.credentials`
    pub fn with_hashed_pins(
        stores: Stores,
        notifier: Arc<dyn NotificationDispatcher>,
        config: &TransferConfig,
    ) -> Self {
        let verifier = Arc::new(HashedPinVerifier::new(stores.credentials.clone()));
        Self::new(stores, verifier, notifier, config)
    }

    // === Transfers ===

    pub async fn send_money(&self, cmd: SendMoney) -> Result<TransferReceipt, TransferError> {
        self.transfers.send_money(cmd).await
    }

    pub async fn resolve(&self, recipient: &Recipient) -> Result<AccountKey, TransferError> {
        self.directory.resolve(recipient).await
    }

    /// Sent and received, newest first. `limit` is clamped to `1..=MAX_HISTORY`.
    pub async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: Option<i64>,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let limit = limit.unwrap_or(MAX_HISTORY).clamp(1, MAX_HISTORY);
        self.ledger.transactions_for_user(user_id, limit).await
    }

    /// A transaction the user took part in
    pub async fn transaction(
        &self,
        user_id: UserId,
        transaction_id: TransactionId,
    ) -> Result<TransactionRecord, TransferError> {
        let record = self
            .ledger
            .transaction(transaction_id)
            .await?
            .ok_or_else(|| {
                TransferError::Validation(format!("transaction {} not found", transaction_id))
            })?;
        if record.sender_user_id != user_id && record.receiver_user_id != Some(user_id) {
            return Err(TransferError::Forbidden(
                "transaction belongs to other users".into(),
            ));
        }
        Ok(record)
    }

    // === Money requests ===

    pub async fn create_money_request(
        &self,
        requester_user_id: UserId,
        cmd: CreateMoneyRequest,
    ) -> Result<MoneyRequest, TransferError> {
        self.requests.create(requester_user_id, cmd).await
    }

    /// `sender_ipa_address` picks the paying IPA; defaults to the one the request named
    pub async fn accept_money_request(
        &self,
        request_id: MoneyRequestId,
        acting_user_id: UserId,
        pin: Pin,
        sender_ipa_address: Option<String>,
    ) -> Result<TransferReceipt, TransferError> {
        self.requests
            .accept(request_id, acting_user_id, pin, sender_ipa_address)
            .await
    }

    pub async fn decline_money_request(
        &self,
        request_id: MoneyRequestId,
        acting_user_id: UserId,
    ) -> Result<MoneyRequest, TransferError> {
        self.requests.decline(request_id, acting_user_id).await
    }

    pub async fn pending_requests(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        self.requests.pending_requests(user_id).await
    }

    pub async fn requests_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        self.requests.requests_for_user(user_id).await
    }

    pub async fn expire_stale_requests(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        self.requests.expire_stale(cutoff).await
    }

    /// Shared with the [`ExpirySweeper`](crate::worker::ExpirySweeper)
    pub fn money_requests(&self) -> Arc<MoneyRequestWorkflow> {
        self.requests.clone()
    }

    // === System settings ===

    pub async fn settings(&self) -> Result<SystemSettings, TransferError> {
        self.policy.settings().await
    }

    pub async fn update_settings(
        &self,
        patch: &SettingsPatch,
        updated_by: Option<UserId>,
    ) -> Result<SystemSettings, TransferError> {
        self.policy.update_settings(patch, updated_by).await
    }

    pub fn on_settings_changed(&self) {
        self.policy.on_settings_changed();
    }

    pub async fn public_status(&self) -> Result<PublicStatus, TransferError> {
        self.policy.public_status().await
    }
}
