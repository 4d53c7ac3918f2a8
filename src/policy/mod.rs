//! Policy Gate
//!
//! System-wide switches consulted before any transfer touches the ledger:
//! a global block with an admin message, and an optional per-transfer limit.
//! Settings are read through a short-lived in-process cache that the admin
//! write path invalidates.

mod cache;

pub use cache::{SettingsCache, TTL_SECONDS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core_types::UserId;
use crate::error::{DEFAULT_BLOCK_MESSAGE, TransferError};
use crate::money::Amount;
use crate::store::SettingsStore;

/// Limit (whole units) used when the settings row is first created
pub const DEFAULT_TRANSFER_LIMIT_UNITS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSettings {
    pub transfer_limit_enabled: bool,
    pub transfer_limit_amount: Amount,
    pub transactions_blocked: bool,
    pub block_message: Option<String>,
    pub maintenance_mode: bool,
    pub maintenance_message: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            transfer_limit_enabled: false,
            transfer_limit_amount: Amount::from_units(DEFAULT_TRANSFER_LIMIT_UNITS),
            transactions_blocked: false,
            block_message: None,
            maintenance_mode: false,
            maintenance_message: None,
            updated_at: None,
            updated_by: None,
        }
    }
}

impl SystemSettings {
    /// Admin block message, or the stock text when none was configured
    pub fn effective_block_message(&self) -> String {
        non_blank(&self.block_message).unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_string())
    }

    /// Apply the transfer-time rules: the block wins over the limit
    pub fn check(&self, amount: Amount) -> Result<(), TransferError> {
        if self.transactions_blocked {
            return Err(TransferError::TransactionsBlocked {
                message: self.effective_block_message(),
            });
        }
        if self.transfer_limit_enabled && amount > self.transfer_limit_amount {
            return Err(TransferError::TransferLimitExceeded {
                limit: self.transfer_limit_amount,
            });
        }
        Ok(())
    }
}

/// Partial update from the admin settings path; `None` leaves a field as is
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub transfer_limit_enabled: Option<bool>,
    #[serde(default)]
    pub transfer_limit_amount: Option<Amount>,
    #[serde(default)]
    pub transactions_blocked: Option<bool>,
    #[serde(default)]
    pub block_message: Option<String>,
    #[serde(default)]
    pub maintenance_mode: Option<bool>,
    #[serde(default)]
    pub maintenance_message: Option<String>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self == &SettingsPatch::default()
    }

    pub fn apply_to(&self, settings: &mut SystemSettings) {
        if let Some(v) = self.transfer_limit_enabled {
            settings.transfer_limit_enabled = v;
        }
        if let Some(v) = self.transfer_limit_amount {
            settings.transfer_limit_amount = v;
        }
        if let Some(v) = self.transactions_blocked {
            settings.transactions_blocked = v;
        }
        if let Some(v) = &self.block_message {
            settings.block_message = Some(v.clone());
        }
        if let Some(v) = self.maintenance_mode {
            settings.maintenance_mode = v;
        }
        if let Some(v) = &self.maintenance_message {
            settings.maintenance_message = Some(v.clone());
        }
    }
}

/// What unauthenticated clients may know about the transfer system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublicStatus {
    pub transactions_enabled: bool,
    pub message: Option<String>,
    pub transfer_limit: Option<Amount>,
}

impl From<&SystemSettings> for PublicStatus {
    fn from(s: &SystemSettings) -> Self {
        let message = if s.transactions_blocked {
            Some(s.effective_block_message())
        } else if s.maintenance_mode {
            non_blank(&s.maintenance_message)
        } else {
            None
        };
        Self {
            transactions_enabled: !s.transactions_blocked && !s.maintenance_mode,
            message,
            transfer_limit: s.transfer_limit_enabled.then_some(s.transfer_limit_amount),
        }
    }
}

pub struct PolicyGate {
    store: Arc<dyn SettingsStore>,
    cache: SettingsCache,
}

impl PolicyGate {
    pub fn new(store: Arc<dyn SettingsStore>, cache_ttl_secs: u64) -> Self {
        Self {
            store,
            cache: SettingsCache::new(cache_ttl_secs),
        }
    }

    /// Current settings, creating the default row on first use.
    ///
    /// A failed read is an error, never a permissive default.
    pub async fn settings(&self) -> Result<SystemSettings, TransferError> {
        if let Some(settings) = self.cache.get() {
            return Ok(settings);
        }
        let generation = self.cache.generation();

        let loaded = match self.store.load().await {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                info!("No system settings row, creating defaults");
                self.store
                    .insert_defaults(&SystemSettings::default())
                    .await
                    .inspect_err(|e| error!(error = %e, "Failed to create default settings"))?
            }
            Err(e) => {
                error!(error = %e, "Failed to load system settings");
                return Err(TransferError::System(format!("settings unavailable: {}", e)));
            }
        };

        if !self.cache.put_if_current(loaded.clone(), generation) {
            debug!("Settings changed while loading, not caching the stale row");
        }
        Ok(loaded)
    }

    /// Reject a prospective transfer before any mutation begins
    pub async fn check_allowed(&self, amount: Amount) -> Result<(), TransferError> {
        self.settings().await?.check(amount)
    }

    /// Admin write path; the cache is invalidated before this returns
    pub async fn update_settings(
        &self,
        patch: &SettingsPatch,
        updated_by: Option<UserId>,
    ) -> Result<SystemSettings, TransferError> {
        if patch.is_empty() {
            return Err(TransferError::Validation("no settings to update".into()));
        }
        // the row must exist before it can be patched
        self.settings().await?;

        let result = self.store.update(patch, updated_by).await;
        self.on_settings_changed();

        let updated = result?;
        info!(
            updated_by = ?updated_by,
            blocked = updated.transactions_blocked,
            limit_enabled = updated.transfer_limit_enabled,
            limit = %updated.transfer_limit_amount,
            "System settings updated"
        );
        Ok(updated)
    }

    /// Invalidation hook for writers that bypass [`update_settings`](Self::update_settings)
    pub fn on_settings_changed(&self) {
        self.cache.invalidate();
    }

    pub async fn public_status(&self) -> Result<PublicStatus, TransferError> {
        Ok(PublicStatus::from(&self.settings().await?))
    }
}

fn non_blank(s: &Option<String>) -> Option<String> {
    s.as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}
