//! Expiry Sweeper
//!
//! Background loop that moves money requests left pending too long to
//! `expired`. The status flip is a compare-and-set, so a sweep racing an
//! accept or decline never overrides it.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::MoneyRequestConfig;
use crate::error::TransferError;
use crate::money_request::MoneyRequestWorkflow;

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub sweep_interval: Duration,
    /// Requests older than this are expired
    pub expire_after: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self::from(&MoneyRequestConfig::default())
    }
}

impl From<&MoneyRequestConfig> for SweeperConfig {
    fn from(config: &MoneyRequestConfig) -> Self {
        Self {
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            expire_after: Duration::from_secs(config.expire_after_hours * 3600),
        }
    }
}

pub struct ExpirySweeper {
    workflow: Arc<MoneyRequestWorkflow>,
    config: SweeperConfig,
}

impl ExpirySweeper {
    pub fn new(workflow: Arc<MoneyRequestWorkflow>, config: SweeperConfig) -> Self {
        Self { workflow, config }
    }

    /// Sweep every `sweep_interval` until `shutdown` flips to true
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            expire_after_secs = self.config.expire_after.as_secs(),
            "Starting money request expiry sweeper"
        );

        // interval() panics on a zero period
        let period = self.config.sweep_interval.max(Duration::from_secs(1));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        error!(error = %e, "Expiry sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Expiry sweeper stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One sweep relative to `now`; returns how many requests expired
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<usize, TransferError> {
        let cutoff = self.cutoff(now)?;
        let expired = self.workflow.expire_stale(cutoff).await?;
        if expired.is_empty() {
            debug!(cutoff = %cutoff, "No stale money requests");
        }
        Ok(expired.len())
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, TransferError> {
        let window = chrono::Duration::from_std(self.config.expire_after)
            .map_err(|e| TransferError::System(format!("expiry window out of range: {}", e)))?;
        now.checked_sub_signed(window)
            .ok_or_else(|| TransferError::System("expiry cutoff out of range".into()))
    }
}
