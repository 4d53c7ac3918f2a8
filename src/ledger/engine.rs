//! Ledger Engine
//!
//! Debit, credit and the transaction row commit together or not at all.
//! Both account rows are write-locked in ascending `AccountKey` order before
//! anything is checked, so opposite-direction transfers between the same pair
//! cannot deadlock and concurrent debits never see a stale balance.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::types::{TransactionRecord, TransferOrder, TransferOutcome};
use crate::core_types::IdempotencyKey;
use crate::error::TransferError;
use crate::store::{LedgerStore, LedgerTx};

/// What a unit produced before commit
enum Applied {
    Fresh(TransferOutcome),
    /// The key committed in another unit while we waited for the locks
    AlreadyCommitted(TransactionRecord),
}

pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
}

impl LedgerEngine {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Execute one transfer atomically.
    ///
    /// A repeated idempotency key returns the original record with
    /// `replayed = true` and moves no money.
    pub async fn execute_transfer(
        &self,
        order: &TransferOrder,
    ) -> Result<TransferOutcome, TransferError> {
        if !order.amount.is_positive() {
            return Err(TransferError::InvalidAmount);
        }
        if order.sender_account == order.receiver_account {
            return Err(TransferError::SelfTransfer);
        }
        check_settlement_key(order)?;

        if let Some(existing) = self
            .store
            .transaction_by_key(order.sender_user_id, &order.idempotency_key)
            .await?
        {
            return replay(order, existing);
        }

        let mut tx = self.store.begin().await?;
        let applied = apply(tx.as_mut(), order).await;

        match applied {
            Ok(Applied::Fresh(outcome)) => {
                if let Err(e) = tx.commit().await {
                    error!(
                        idempotency_key = %order.idempotency_key,
                        error = %e,
                        "Ledger commit failed"
                    );
                    return Err(e);
                }
                info!(
                    transaction_id = outcome.record.transaction_id,
                    method = %order.method(),
                    amount = %order.amount,
                    from = %order.sender_account,
                    to = %order.receiver_account,
                    "Transfer committed"
                );
                Ok(outcome)
            }
            Ok(Applied::AlreadyCommitted(existing)) => {
                rollback_quietly(tx, order).await;
                replay(order, existing)
            }
            Err(e) => {
                rollback_quietly(tx, order).await;
                debug!(
                    idempotency_key = %order.idempotency_key,
                    code = e.code(),
                    "Transfer rolled back"
                );
                Err(e)
            }
        }
    }
}

async fn apply(tx: &mut dyn LedgerTx, order: &TransferOrder) -> Result<Applied, TransferError> {
    // Global lock order, independent of direction
    let sender_first = order.sender_account < order.receiver_account;
    let (first, second) = if sender_first {
        (&order.sender_account, &order.receiver_account)
    } else {
        (&order.receiver_account, &order.sender_account)
    };
    let first_row = tx.lock_account(first).await?;
    let second_row = tx.lock_account(second).await?;
    let (sender, receiver) = if sender_first {
        (first_row, second_row)
    } else {
        (second_row, first_row)
    };

    let sender = sender.ok_or_else(|| {
        TransferError::SenderAccountNotFound(order.sender_account.to_string())
    })?;
    let receiver = receiver.ok_or_else(|| {
        TransferError::RecipientNotFound(format!("account {}", order.receiver_account))
    })?;

    if let Some(existing) = tx
        .transaction_by_key(order.sender_user_id, &order.idempotency_key)
        .await?
    {
        return Ok(Applied::AlreadyCommitted(existing));
    }

    if !sender.is_active() {
        return Err(TransferError::AccountInactive(sender.key));
    }
    if !receiver.is_active() {
        return Err(TransferError::AccountInactive(receiver.key));
    }
    if sender.balance < order.amount {
        return Err(TransferError::InsufficientFunds);
    }

    let sender_balance = tx.debit(&sender.key, order.amount).await?;
    let receiver_balance = tx.credit(&receiver.key, order.amount).await?;
    let record = tx.insert_transaction(&order.to_new_transaction()).await?;

    if let Some(request_id) = order.settles
        && !tx
            .settle_money_request(request_id, record.transaction_id)
            .await?
    {
        return Err(TransferError::InvalidState {
            current: "no longer pending".into(),
        });
    }

    Ok(Applied::Fresh(TransferOutcome {
        record,
        sender_balance: Some(sender_balance),
        receiver_balance: Some(receiver_balance),
        replayed: false,
    }))
}

/// Money request keys belong to the settlement of that request and nothing else
fn check_settlement_key(order: &TransferOrder) -> Result<(), TransferError> {
    let matches = match order.settles {
        Some(request_id) => order.idempotency_key == IdempotencyKey::for_money_request(request_id),
        None => !order.idempotency_key.is_money_request(),
    };
    if matches {
        Ok(())
    } else {
        Err(TransferError::Validation(
            "idempotency key does not match the money request being settled".into(),
        ))
    }
}

/// Hand back the committed result of a repeated key
fn replay(
    order: &TransferOrder,
    existing: TransactionRecord,
) -> Result<TransferOutcome, TransferError> {
    let same_transfer = existing.sender_user_id == order.sender_user_id
        && existing.sender_account == order.sender_account
        && existing.receiver_account == order.receiver_account
        && existing.amount == order.amount;
    if !same_transfer {
        warn!(
            idempotency_key = %order.idempotency_key,
            transaction_id = existing.transaction_id,
            "Idempotency key reused for a different transfer"
        );
        return Err(TransferError::Validation(
            "idempotency key was already used for a different transfer".into(),
        ));
    }

    info!(
        idempotency_key = %order.idempotency_key,
        transaction_id = existing.transaction_id,
        "Idempotent replay, returning committed transfer"
    );
    Ok(TransferOutcome {
        record: existing,
        sender_balance: None,
        receiver_balance: None,
        replayed: true,
    })
}

async fn rollback_quietly(tx: Box<dyn LedgerTx>, order: &TransferOrder) {
    if let Err(e) = tx.rollback().await {
        // the connection drops the transaction anyway
        warn!(idempotency_key = %order.idempotency_key, error = %e, "Rollback failed");
    }
}
