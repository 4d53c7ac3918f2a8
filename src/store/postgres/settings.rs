use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgStore, amount_col};
use crate::core_types::UserId;
use crate::error::TransferError;
use crate::policy::{SettingsPatch, SystemSettings};
use crate::store::SettingsStore;

const SETTINGS_COLUMNS: &str = r#"
    transfer_limit_enabled, transfer_limit_amount, transactions_blocked, block_message,
    maintenance_mode, maintenance_message, updated_at, updated_by
"#;

fn settings_from_row(row: &PgRow) -> Result<SystemSettings, TransferError> {
    Ok(SystemSettings {
        transfer_limit_enabled: row.try_get("transfer_limit_enabled")?,
        transfer_limit_amount: amount_col(row, "transfer_limit_amount")?,
        transactions_blocked: row.try_get("transactions_blocked")?,
        block_message: row.try_get("block_message")?,
        maintenance_mode: row.try_get("maintenance_mode")?,
        maintenance_message: row.try_get("maintenance_message")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: row.try_get("updated_by")?,
    })
}

#[async_trait]
impl SettingsStore for PgStore {
    async fn load(&self) -> Result<Option<SystemSettings>, TransferError> {
        let sql = format!(
            "SELECT {} FROM system_settings_tb WHERE setting_id = 1",
            SETTINGS_COLUMNS
        );
        sqlx::query(&sql)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(settings_from_row)
            .transpose()
    }

    async fn insert_defaults(
        &self,
        defaults: &SystemSettings,
    ) -> Result<SystemSettings, TransferError> {
        sqlx::query(
            r#"
            INSERT INTO system_settings_tb
                (setting_id, transfer_limit_enabled, transfer_limit_amount,
                 transactions_blocked, block_message, maintenance_mode, maintenance_message)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (setting_id) DO NOTHING
            "#,
        )
        .bind(defaults.transfer_limit_enabled)
        .bind(defaults.transfer_limit_amount.inner())
        .bind(defaults.transactions_blocked)
        .bind(&defaults.block_message)
        .bind(defaults.maintenance_mode)
        .bind(&defaults.maintenance_message)
        .execute(&self.pool)
        .await?;

        // another instance may have won the insert
        self.load()
            .await?
            .ok_or_else(|| TransferError::System("system settings row missing after insert".into()))
    }

    async fn update(
        &self,
        patch: &SettingsPatch,
        updated_by: Option<UserId>,
    ) -> Result<SystemSettings, TransferError> {
        let sql = format!(
            r#"
            UPDATE system_settings_tb SET
                transfer_limit_enabled = COALESCE($1, transfer_limit_enabled),
                transfer_limit_amount  = COALESCE($2, transfer_limit_amount),
                transactions_blocked   = COALESCE($3, transactions_blocked),
                block_message          = COALESCE($4, block_message),
                maintenance_mode       = COALESCE($5, maintenance_mode),
                maintenance_message    = COALESCE($6, maintenance_message),
                updated_by             = COALESCE($7, updated_by),
                updated_at             = NOW()
            WHERE setting_id = 1
            RETURNING {}
            "#,
            SETTINGS_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(patch.transfer_limit_enabled)
            .bind(patch.transfer_limit_amount.map(|a| a.inner()))
            .bind(patch.transactions_blocked)
            .bind(&patch.block_message)
            .bind(patch.maintenance_mode)
            .bind(&patch.maintenance_message)
            .bind(updated_by)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| TransferError::System("system settings row missing".into()))?;

        settings_from_row(&row)
    }
}
