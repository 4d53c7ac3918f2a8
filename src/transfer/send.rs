use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::pipeline::{TransferPipeline, TransferRequest};
use crate::core_types::{IdempotencyKey, TransactionId, UserId};
use crate::credentials::Pin;
use crate::directory::{FundingSource, Recipient};
use crate::error::TransferError;
use crate::money::Amount;

/// Inbound "send money" call, as the HTTP layer hands it over
#[derive(Debug, Clone, Deserialize)]
pub struct SendMoney {
    /// Authenticated by the session layer
    #[serde(skip)]
    pub sender_user_id: UserId,
    #[serde(flatten)]
    pub recipient: Recipient,
    pub amount: Amount,
    pub pin: Pin,
    /// Generated when absent; a client that wants safe retries must send one
    #[serde(default)]
    pub idempotency_key: Option<IdempotencyKey>,
    #[serde(default)]
    pub source: Option<FundingSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub transaction_id: TransactionId,
    pub status: String,
    /// The key had already committed; nothing moved this time
    pub replayed: bool,
}

pub struct TransferService {
    pipeline: Arc<TransferPipeline>,
}

impl TransferService {
    pub fn new(pipeline: Arc<TransferPipeline>) -> Self {
        Self { pipeline }
    }

    pub async fn send_money(&self, cmd: SendMoney) -> Result<TransferReceipt, TransferError> {
        let outcome = self
            .pipeline
            .run(TransferRequest {
                sender_user_id: cmd.sender_user_id,
                recipient: cmd.recipient,
                amount: cmd.amount,
                pin: cmd.pin,
                idempotency_key: cmd.idempotency_key.unwrap_or_else(IdempotencyKey::generate),
                source: cmd.source,
                settles: None,
            })
            .await?;

        Ok(TransferReceipt {
            transaction_id: outcome.record.transaction_id,
            status: outcome.record.status,
            replayed: outcome.replayed,
        })
    }
}
