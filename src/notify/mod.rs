//! Notification Dispatch
//!
//! Best-effort delivery of "payment sent / received" and money request
//! lifecycle messages. Sinks report failure through `anyhow`, but callers go
//! through [`dispatch_transfer`] / [`dispatch_money_request`], which run the
//! sink on a spawned task and only log what went wrong.

pub mod message;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core_types::UserId;
use crate::ledger::TransactionRecord;
use crate::models::UserProfile;
use crate::money::Amount;
use crate::money_request::MoneyRequestEvent;

/// Everything a sink needs to tell both parties about a committed transfer
#[derive(Debug, Clone)]
pub struct TransferNotice {
    pub record: TransactionRecord,
    pub sender: Option<UserProfile>,
    pub receiver: Option<UserProfile>,
    pub sender_balance: Option<Amount>,
    pub receiver_balance: Option<Amount>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    fn name(&self) -> &str;

    async fn notify_transfer_completed(&self, notice: &TransferNotice) -> anyhow::Result<()>;

    async fn notify_money_request(&self, event: &MoneyRequestEvent) -> anyhow::Result<()>;
}

/// Fire-and-forget transfer notification
pub fn dispatch_transfer(
    notifier: Arc<dyn NotificationDispatcher>,
    notice: TransferNotice,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_transfer_completed(&notice).await {
            warn!(
                sink = notifier.name(),
                transaction_id = notice.record.transaction_id,
                error = %e,
                "Transfer notification failed"
            );
        }
    })
}

/// Fire-and-forget money request notification
pub fn dispatch_money_request(
    notifier: Arc<dyn NotificationDispatcher>,
    event: MoneyRequestEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = notifier.notify_money_request(&event).await {
            warn!(
                sink = notifier.name(),
                request_id = event.request.request_id,
                action = event.action.as_str(),
                error = %e,
                "Money request notification failed"
            );
        }
    })
}

// ============================================================================
// Log sink
// ============================================================================

/// Writes rendered messages to the log
pub struct LogNotifier {
    currency: String,
}

impl LogNotifier {
    pub fn new(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify_transfer_completed(&self, notice: &TransferNotice) -> anyhow::Result<()> {
        let sent = message::payment_sent(notice);
        info!(
            to = notice.record.sender_user_id,
            transaction_id = notice.record.transaction_id,
            "{}\n{}",
            sent.title,
            sent.body
        );
        if let Some(receiver) = notice.record.receiver_user_id {
            let received = message::payment_received(notice);
            info!(
                to = receiver,
                transaction_id = notice.record.transaction_id,
                "{}\n{}",
                received.title,
                received.body
            );
        }
        Ok(())
    }

    async fn notify_money_request(&self, event: &MoneyRequestEvent) -> anyhow::Result<()> {
        let msg = message::money_request(event, &self.currency);
        info!(
            to = event.to,
            request_id = event.request.request_id,
            "{}: {}",
            msg.title,
            msg.body
        );
        Ok(())
    }
}

// ============================================================================
// Push sink
// ============================================================================

/// Envelope posted to the push gateway, which forwards it to the user's socket
#[derive(Debug, Serialize)]
struct PushEnvelope<'a, T: Serialize> {
    to: UserId,
    #[serde(rename = "type")]
    kind: &'static str,
    action: &'a str,
    data: T,
}

/// POSTs JSON envelopes to a push gateway
pub struct PushNotifier {
    client: reqwest::Client,
    endpoint: String,
    currency: String,
}

impl PushNotifier {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        currency: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            currency: currency.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: Serialize + Sync>(&self, envelope: &PushEnvelope<'_, T>) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .json(envelope)
            .send()
            .await?;
        if !resp.status().is_success() {
            anyhow::bail!("push gateway answered {}", resp.status());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for PushNotifier {
    fn name(&self) -> &str {
        "push"
    }

    async fn notify_transfer_completed(&self, notice: &TransferNotice) -> anyhow::Result<()> {
        let r = &notice.record;

        let sent = message::payment_sent(notice);
        self.post(&PushEnvelope {
            to: r.sender_user_id,
            kind: "transaction_notification",
            action: "sent",
            data: json!({
                "transaction": r,
                "balance": notice.sender_balance,
                "title": sent.title,
                "message": sent.body,
            }),
        })
        .await?;

        if let Some(receiver) = r.receiver_user_id {
            let received = message::payment_received(notice);
            self.post(&PushEnvelope {
                to: receiver,
                kind: "transaction_notification",
                action: "received",
                data: json!({
                    "transaction": r,
                    "balance": notice.receiver_balance,
                    "title": received.title,
                    "message": received.body,
                }),
            })
            .await?;
        }
        Ok(())
    }

    async fn notify_money_request(&self, event: &MoneyRequestEvent) -> anyhow::Result<()> {
        let msg = message::money_request(event, &self.currency);
        self.post(&PushEnvelope {
            to: event.to,
            kind: "money_request",
            action: event.action.as_str(),
            data: json!({
                "request": event.request,
                "title": msg.title,
                "message": msg.body,
            }),
        })
        .await
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Delivers to every sink concurrently; fails if any sink failed
pub struct FanoutNotifier {
    sinks: Vec<Arc<dyn NotificationDispatcher>>,
}

impl FanoutNotifier {
    pub fn new(sinks: Vec<Arc<dyn NotificationDispatcher>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn collect(&self, results: Vec<anyhow::Result<()>>) -> anyhow::Result<()> {
        let failed: Vec<String> = self
            .sinks
            .iter()
            .zip(results)
            .filter_map(|(sink, r)| r.err().map(|e| format!("{}: {}", sink.name(), e)))
            .collect();
        if failed.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "{} of {} sinks failed ({})",
                failed.len(),
                self.sinks.len(),
                failed.join("; ")
            )
        }
    }
}

#[async_trait]
impl NotificationDispatcher for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn notify_transfer_completed(&self, notice: &TransferNotice) -> anyhow::Result<()> {
        let results = join_all(
            self.sinks
                .iter()
                .map(|s| s.notify_transfer_completed(notice)),
        )
        .await;
        self.collect(results)
    }

    async fn notify_money_request(&self, event: &MoneyRequestEvent) -> anyhow::Result<()> {
        let results = join_all(self.sinks.iter().map(|s| s.notify_money_request(event))).await;
        self.collect(results)
    }
}
