//! Transfer Pipeline
//!
//! The one path every money movement takes, direct sends and money request
//! acceptance alike:
//!
//! policy gate -> input validation -> sender/receiver resolution ->
//! self-transfer check -> PIN -> ledger unit -> notification (spawned)
//!
//! The PIN is checked before the ledger unit opens, so no row lock is held
//! while the hash is computed.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core_types::{IdempotencyKey, MoneyRequestId, UserId};
use crate::credentials::{CredentialVerifier, Pin};
use crate::directory::{AccountDirectory, FundingSource, Recipient};
use crate::error::TransferError;
use crate::ledger::{LedgerEngine, TransferOrder, TransferOutcome};
use crate::money::Amount;
use crate::notify::{NotificationDispatcher, TransferNotice, dispatch_transfer};
use crate::policy::PolicyGate;

/// One attempt to move money
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender_user_id: UserId,
    pub recipient: Recipient,
    pub amount: Amount,
    pub pin: Pin,
    pub idempotency_key: IdempotencyKey,
    pub source: Option<FundingSource>,
    /// Pending money request this transfer pays
    pub settles: Option<MoneyRequestId>,
}

pub struct TransferPipeline {
    directory: Arc<AccountDirectory>,
    policy: Arc<PolicyGate>,
    verifier: Arc<dyn CredentialVerifier>,
    ledger: Arc<LedgerEngine>,
    notifier: Arc<dyn NotificationDispatcher>,
    currency: String,
}

impl TransferPipeline {
    pub fn new(
        directory: Arc<AccountDirectory>,
        policy: Arc<PolicyGate>,
        verifier: Arc<dyn CredentialVerifier>,
        ledger: Arc<LedgerEngine>,
        notifier: Arc<dyn NotificationDispatcher>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            policy,
            verifier,
            ledger,
            notifier,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub async fn run(&self, req: TransferRequest) -> Result<TransferOutcome, TransferError> {
        let result = self.execute(&req).await;
        match &result {
            Ok(outcome) => debug!(
                transaction_id = outcome.record.transaction_id,
                replayed = outcome.replayed,
                "Transfer pipeline finished"
            ),
            Err(e @ TransferError::System(_)) => error!(
                sender = req.sender_user_id,
                idempotency_key = %req.idempotency_key,
                error = %e,
                "Transfer failed unexpectedly"
            ),
            Err(e) => info!(
                sender = req.sender_user_id,
                idempotency_key = %req.idempotency_key,
                code = e.code(),
                "Transfer rejected"
            ),
        }
        result
    }

    async fn execute(&self, req: &TransferRequest) -> Result<TransferOutcome, TransferError> {
        // Policy outranks everything, including a bad PIN
        self.policy.check_allowed(req.amount).await?;

        if !req.amount.is_positive() {
            return Err(TransferError::InvalidAmount);
        }
        req.recipient.validate()?;

        let sender = self.directory.user(req.sender_user_id).await?;
        let funding = self
            .directory
            .resolve_funding_source(&sender, req.source.as_ref())
            .await?;
        let receiver = self.directory.resolve_recipient(&req.recipient).await?;

        if funding.account.key == receiver.account.key {
            return Err(TransferError::SelfTransfer);
        }

        // exactly once per attempt, against the sender's own context
        self.verifier.verify(&funding.auth, &req.pin).await?;

        let order = TransferOrder {
            idempotency_key: req.idempotency_key.clone(),
            sender_user_id: sender.user_id,
            sender_name: sender.display_name(),
            sender_account: funding.account.key.clone(),
            sender_ipa_address: funding.ipa_address.clone(),
            receiver_user_id: receiver.owner.as_ref().map(|u| u.user_id),
            receiver_name: receiver.owner.as_ref().map(|u| u.display_name()),
            receiver_account: receiver.account.key.clone(),
            amount: req.amount,
            recipient: req.recipient.clone(),
            currency: self.currency.clone(),
            settles: req.settles,
        };

        let outcome = self.ledger.execute_transfer(&order).await?;

        if !outcome.replayed {
            dispatch_transfer(
                self.notifier.clone(),
                TransferNotice {
                    record: outcome.record.clone(),
                    sender: Some(sender),
                    receiver: receiver.owner,
                    sender_balance: outcome.sender_balance,
                    receiver_balance: outcome.receiver_balance,
                },
            );
        }

        Ok(outcome)
    }
}
