use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{PgStore, amount_col};
use crate::core_types::{MoneyRequestId, UserId};
use crate::error::TransferError;
use crate::money_request::{MoneyRequest, MoneyRequestStatus, NewMoneyRequest};
use crate::store::MoneyRequestStore;

const REQUEST_COLUMNS: &str = r#"
    request_id, requester_user_id, requester_name, requested_user_id, requested_name,
    amount, requester_ipa_address, requested_ipa_address, message, status,
    transaction_id, created_at, updated_at
"#;

fn request_from_row(row: &PgRow) -> Result<MoneyRequest, TransferError> {
    let status: i16 = row.try_get("status")?;
    Ok(MoneyRequest {
        request_id: row.try_get("request_id")?,
        requester_user_id: row.try_get("requester_user_id")?,
        requester_name: row.try_get("requester_name")?,
        requested_user_id: row.try_get("requested_user_id")?,
        requested_name: row.try_get("requested_name")?,
        amount: amount_col(row, "amount")?,
        requester_ipa_address: row.try_get("requester_ipa_address")?,
        requested_ipa_address: row.try_get("requested_ipa_address")?,
        message: row.try_get("message")?,
        status: MoneyRequestStatus::from_id(status).ok_or_else(|| {
            TransferError::System(format!("unknown money request status {}", status))
        })?,
        transaction_id: row.try_get("transaction_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MoneyRequestStore for PgStore {
    async fn insert(&self, request: &NewMoneyRequest) -> Result<MoneyRequest, TransferError> {
        let sql = format!(
            r#"
            INSERT INTO money_requests_tb
                (requester_user_id, requester_name, requested_user_id, requested_name,
                 amount, requester_ipa_address, requested_ipa_address, message, status,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW(), NOW())
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(request.requester_user_id)
            .bind(&request.requester_name)
            .bind(request.requested_user_id)
            .bind(&request.requested_name)
            .bind(request.amount.inner())
            .bind(&request.requester_ipa_address)
            .bind(&request.requested_ipa_address)
            .bind(&request.message)
            .bind(MoneyRequestStatus::Pending.id())
            .fetch_one(&self.pool)
            .await?;
        request_from_row(&row)
    }

    async fn get(
        &self,
        request_id: MoneyRequestId,
    ) -> Result<Option<MoneyRequest>, TransferError> {
        let sql = format!(
            "SELECT {} FROM money_requests_tb WHERE request_id = $1",
            REQUEST_COLUMNS
        );
        sqlx::query(&sql)
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(request_from_row)
            .transpose()
    }

    async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM money_requests_tb
            WHERE requested_user_id = $1 AND status = $2
            ORDER BY created_at DESC, request_id DESC
            "#,
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(MoneyRequestStatus::Pending.id())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM money_requests_tb
            WHERE requester_user_id = $1 OR requested_user_id = $1
            ORDER BY created_at DESC, request_id DESC
            "#,
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }

    /// Atomic CAS update: only succeeds if the request is still in `from`
    async fn transition(
        &self,
        request_id: MoneyRequestId,
        from: MoneyRequestStatus,
        to: MoneyRequestStatus,
    ) -> Result<bool, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE money_requests_tb
            SET status = $1, updated_at = NOW()
            WHERE request_id = $2 AND status = $3
            "#,
        )
        .bind(to.id())
        .bind(request_id)
        .bind(from.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        let sql = format!(
            r#"
            UPDATE money_requests_tb
            SET status = $1, updated_at = NOW()
            WHERE status = $2 AND created_at < $3
            RETURNING {}
            "#,
            REQUEST_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(MoneyRequestStatus::Expired.id())
            .bind(MoneyRequestStatus::Pending.id())
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(request_from_row).collect()
    }
}
