//! Money Request Workflow
//!
//! ```text
//! PENDING ──accept──▶ ACCEPTED   (ledger unit flips the status)
//!    │────decline───▶ DECLINED
//!    └────sweep─────▶ EXPIRED
//! ```
//!
//! Acceptance pays the requester through the same pipeline as a direct send,
//! keyed by the request id so a retried accept cannot pay twice.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::state::MoneyRequestStatus;
use super::types::{
    CreateMoneyRequest, MAX_MESSAGE_LEN, MoneyRequest, MoneyRequestAction, MoneyRequestEvent,
    NewMoneyRequest,
};
use crate::core_types::{IdempotencyKey, MoneyRequestId, UserId};
use crate::credentials::Pin;
use crate::directory::{AccountDirectory, FundingSource, Recipient};
use crate::error::TransferError;
use crate::notify::{NotificationDispatcher, dispatch_money_request};
use crate::store::MoneyRequestStore;
use crate::transfer::{TransferPipeline, TransferReceipt, TransferRequest};

pub struct MoneyRequestWorkflow {
    store: Arc<dyn MoneyRequestStore>,
    directory: Arc<AccountDirectory>,
    pipeline: Arc<TransferPipeline>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl MoneyRequestWorkflow {
    pub fn new(
        store: Arc<dyn MoneyRequestStore>,
        directory: Arc<AccountDirectory>,
        pipeline: Arc<TransferPipeline>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            directory,
            pipeline,
            notifier,
        }
    }

    /// Ask the owner of `requested_ipa_address` for money.
    /// Funds will land on the requester's default IPA.
    pub async fn create(
        &self,
        requester_user_id: UserId,
        cmd: CreateMoneyRequest,
    ) -> Result<MoneyRequest, TransferError> {
        if !cmd.amount.is_positive() {
            return Err(TransferError::InvalidAmount);
        }
        let message = normalize_message(cmd.message)?;

        let requester = self.directory.user(requester_user_id).await?;
        let requester_ipa = self.directory.default_ipa(&requester).await?.ok_or_else(|| {
            TransferError::Validation("you need a payment address to request money".into())
        })?;

        let address = cmd.requested_ipa_address.trim();
        let requested_ipa = self
            .directory
            .ipa(address)
            .await?
            .ok_or_else(|| TransferError::RecipientNotFound(format!("ipa {}", address)))?;
        let requested = match self.directory.user(requested_ipa.user_id).await {
            Ok(user) => user,
            Err(TransferError::Validation(_)) => {
                return Err(TransferError::RecipientNotFound(format!("ipa {}", address)));
            }
            Err(e) => return Err(e),
        };

        if requested.user_id == requester.user_id {
            return Err(TransferError::Validation(
                "cannot request money from yourself".into(),
            ));
        }

        let request = self
            .store
            .insert(&NewMoneyRequest {
                requester_user_id: requester.user_id,
                requester_name: requester.display_name(),
                requested_user_id: requested.user_id,
                requested_name: requested.display_name(),
                amount: cmd.amount,
                requester_ipa_address: requester_ipa.ipa_address,
                requested_ipa_address: requested_ipa.ipa_address,
                message,
            })
            .await?;

        info!(
            request_id = request.request_id,
            requester = request.requester_user_id,
            requested = request.requested_user_id,
            amount = %request.amount,
            "Money request created"
        );
        self.notify(request.requested_user_id, MoneyRequestAction::Created, &request);
        Ok(request)
    }

    /// Pay a pending request. Only the requested user may accept.
    pub async fn accept(
        &self,
        request_id: MoneyRequestId,
        acting_user_id: UserId,
        pin: Pin,
        sender_ipa_address: Option<String>,
    ) -> Result<TransferReceipt, TransferError> {
        let mut request = self.load_for_action(request_id, acting_user_id).await?;

        let paying_ipa = sender_ipa_address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| request.requested_ipa_address.clone());

        let result = self
            .pipeline
            .run(TransferRequest {
                sender_user_id: acting_user_id,
                recipient: Recipient::Ipa {
                    address: request.requester_ipa_address.clone(),
                },
                amount: request.amount,
                pin,
                idempotency_key: IdempotencyKey::for_money_request(request_id),
                source: Some(FundingSource::Ipa {
                    address: paying_ipa,
                }),
                settles: Some(request_id),
            })
            .await;

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(TransferError::InvalidState { .. }) => {
                // lost the race to decline or expiry; report what won
                return Err(self.current_state(request_id).await);
            }
            Err(e) => return Err(e),
        };

        if outcome.replayed {
            let current = self.get(request_id).await?;
            if current.status != MoneyRequestStatus::Accepted
                || current.transaction_id != Some(outcome.record.transaction_id)
            {
                warn!(
                    request_id,
                    transaction_id = outcome.record.transaction_id,
                    status = %current.status,
                    "Replayed transfer does not settle this money request"
                );
                return Err(TransferError::InvalidState {
                    current: current.status.to_string(),
                });
            }
        }

        info!(
            request_id,
            transaction_id = outcome.record.transaction_id,
            replayed = outcome.replayed,
            "Money request accepted"
        );

        if !outcome.replayed {
            request.status = MoneyRequestStatus::Accepted;
            request.transaction_id = Some(outcome.record.transaction_id);
            request.updated_at = outcome.record.transaction_time;
            self.notify(request.requester_user_id, MoneyRequestAction::Accepted, &request);
        }

        Ok(TransferReceipt {
            transaction_id: outcome.record.transaction_id,
            status: outcome.record.status,
            replayed: outcome.replayed,
        })
    }

    /// Refuse a pending request. No money moves.
    pub async fn decline(
        &self,
        request_id: MoneyRequestId,
        acting_user_id: UserId,
    ) -> Result<MoneyRequest, TransferError> {
        let mut request = self.load_for_action(request_id, acting_user_id).await?;

        if !self
            .store
            .transition(
                request_id,
                MoneyRequestStatus::Pending,
                MoneyRequestStatus::Declined,
            )
            .await?
        {
            return Err(self.current_state(request_id).await);
        }

        request.status = MoneyRequestStatus::Declined;
        request.updated_at = Utc::now();
        info!(request_id, by = acting_user_id, "Money request declined");
        self.notify(request.requester_user_id, MoneyRequestAction::Declined, &request);
        Ok(request)
    }

    /// Expire every request still pending that was created before `cutoff`
    pub async fn expire_stale(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        let expired = self.store.expire_older_than(cutoff).await?;
        if !expired.is_empty() {
            info!(count = expired.len(), cutoff = %cutoff, "Expired stale money requests");
        }
        for request in &expired {
            self.notify(request.requester_user_id, MoneyRequestAction::Expired, request);
        }
        Ok(expired)
    }

    /// Pending requests the user has been asked to pay, newest first
    pub async fn pending_requests(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        self.store.pending_for_user(user_id).await
    }

    /// Sent and received, newest first
    pub async fn requests_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        self.store.all_for_user(user_id).await
    }

    pub async fn get(&self, request_id: MoneyRequestId) -> Result<MoneyRequest, TransferError> {
        self.store
            .get(request_id)
            .await?
            .ok_or(TransferError::MoneyRequestNotFound(request_id))
    }

    /// Fetch, check ownership, check the request can still move
    async fn load_for_action(
        &self,
        request_id: MoneyRequestId,
        acting_user_id: UserId,
    ) -> Result<MoneyRequest, TransferError> {
        let request = self.get(request_id).await?;
        if request.requested_user_id != acting_user_id {
            return Err(TransferError::Forbidden(
                "only the requested user can act on this request".into(),
            ));
        }
        if request.status != MoneyRequestStatus::Pending {
            return Err(TransferError::InvalidState {
                current: request.status.to_string(),
            });
        }
        Ok(request)
    }

    async fn current_state(&self, request_id: MoneyRequestId) -> TransferError {
        match self.get(request_id).await {
            Ok(request) => TransferError::InvalidState {
                current: request.status.to_string(),
            },
            Err(e) => e,
        }
    }

    fn notify(&self, to: UserId, action: MoneyRequestAction, request: &MoneyRequest) {
        dispatch_money_request(
            self.notifier.clone(),
            MoneyRequestEvent {
                to,
                action,
                request: request.clone(),
            },
        );
    }
}

fn normalize_message(message: Option<String>) -> Result<Option<String>, TransferError> {
    let Some(m) = message else {
        return Ok(None);
    };
    let m = m.trim();
    if m.is_empty() {
        return Ok(None);
    }
    if m.chars().count() > MAX_MESSAGE_LEN {
        return Err(TransferError::Validation(format!(
            "message longer than {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(Some(m.to_string()))
}
