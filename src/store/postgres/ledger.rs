use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};

use super::{ACCOUNT_COLUMNS, LOCK_TIMEOUT_MS, PgStore, account_from_row, amount_col};
use crate::core_types::{
    AccountKey, IdempotencyKey, MoneyRequestId, TransactionId, UserId,
};
use crate::directory::TransferMethod;
use crate::error::{TransferError, is_unique_violation};
use crate::ledger::{NewTransaction, TransactionRecord};
use crate::models::BankAccount;
use crate::money::Amount;
use crate::money_request::MoneyRequestStatus;
use crate::store::{LedgerStore, LedgerTx};

const TX_COLUMNS: &str = r#"
    transaction_id, idempotency_key, sender_user_id, sender_name,
    receiver_user_id, receiver_name, amount,
    sender_bank_id, sender_account_number, receiver_bank_id, receiver_account_number,
    transfer_method, sender_ipa_address, receiver_ipa_address,
    receiver_phone, receiver_card, receiver_iban, status, currency, transaction_time
"#;

fn transaction_from_row(row: &PgRow) -> Result<TransactionRecord, TransferError> {
    let method: String = row.try_get("transfer_method")?;
    Ok(TransactionRecord {
        transaction_id: row.try_get("transaction_id")?,
        idempotency_key: row.try_get("idempotency_key")?,
        sender_user_id: row.try_get("sender_user_id")?,
        sender_name: row.try_get("sender_name")?,
        receiver_user_id: row.try_get("receiver_user_id")?,
        receiver_name: row.try_get("receiver_name")?,
        amount: amount_col(row, "amount")?,
        sender_account: AccountKey::new(
            row.try_get::<i32, _>("sender_bank_id")?,
            row.try_get::<String, _>("sender_account_number")?,
        ),
        receiver_account: AccountKey::new(
            row.try_get::<i32, _>("receiver_bank_id")?,
            row.try_get::<String, _>("receiver_account_number")?,
        ),
        transfer_method: TransferMethod::parse(&method)
            .ok_or_else(|| TransferError::System(format!("unknown transfer method {}", method)))?,
        sender_ipa_address: row.try_get("sender_ipa_address")?,
        receiver_ipa_address: row.try_get("receiver_ipa_address")?,
        receiver_phone: row.try_get("receiver_phone")?,
        receiver_card: row.try_get("receiver_card")?,
        receiver_iban: row.try_get("receiver_iban")?,
        status: row.try_get("status")?,
        currency: row.try_get("currency")?,
        transaction_time: row.try_get("transaction_time")?,
    })
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, TransferError> {
        let mut tx = self.pool.begin().await?;
        // SET LOCAL does not take bind parameters
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", LOCK_TIMEOUT_MS))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn transaction_by_key(
        &self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transactions_tb WHERE sender_user_id = $1 AND idempotency_key = $2",
            TX_COLUMNS
        );
        sqlx::query(&sql)
            .bind(sender_user_id)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(transaction_from_row)
            .transpose()
    }

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let sql = format!("SELECT {} FROM transactions_tb WHERE transaction_id = $1", TX_COLUMNS);
        sqlx::query(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(transaction_from_row)
            .transpose()
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM transactions_tb
            WHERE sender_user_id = $1 OR receiver_user_id = $1
            ORDER BY transaction_time DESC, transaction_id DESC
            LIMIT $2
            "#,
            TX_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(transaction_from_row).collect()
    }
}

/// One ledger unit over a PostgreSQL transaction.
///
/// Dropping it without `commit` rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    /// Why a guarded UPDATE touched no row
    async fn explain_miss(&mut self, key: &AccountKey) -> Result<TransferError, TransferError> {
        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM bank_accounts_tb WHERE bank_id = $1 AND account_number = $2",
        )
        .bind(key.bank_id)
        .bind(&key.account_number)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(match status.as_deref() {
            None => TransferError::System(format!("account {} vanished", key)),
            Some("active") => TransferError::InsufficientFunds,
            Some(_) => TransferError::AccountInactive(key.clone()),
        })
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_account(
        &mut self,
        key: &AccountKey,
    ) -> Result<Option<BankAccount>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM bank_accounts_tb
            WHERE bank_id = $1 AND account_number = $2
            FOR UPDATE
            "#,
            ACCOUNT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(key.bank_id)
            .bind(&key.account_number)
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn debit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError> {
        // second guard behind the locked re-read
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE bank_accounts_tb
            SET balance = balance - $3
            WHERE bank_id = $1 AND account_number = $2
              AND status = 'active' AND balance >= $3
            RETURNING balance
            "#,
        )
        .bind(key.bank_id)
        .bind(&key.account_number)
        .bind(amount.inner())
        .fetch_optional(&mut *self.tx)
        .await?;

        match balance {
            Some(b) => Ok(Amount::new(b)?),
            None => Err(self.explain_miss(key).await?),
        }
    }

    async fn credit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError> {
        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            UPDATE bank_accounts_tb
            SET balance = balance + $3
            WHERE bank_id = $1 AND account_number = $2 AND status = 'active'
            RETURNING balance
            "#,
        )
        .bind(key.bank_id)
        .bind(&key.account_number)
        .bind(amount.inner())
        .fetch_optional(&mut *self.tx)
        .await?;

        match balance {
            Some(b) => Ok(Amount::new(b)?),
            None => Err(self.explain_miss(key).await?),
        }
    }

    async fn transaction_by_key(
        &mut self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let sql = format!(
            "SELECT {} FROM transactions_tb WHERE sender_user_id = $1 AND idempotency_key = $2",
            TX_COLUMNS
        );
        sqlx::query(&sql)
            .bind(sender_user_id)
            .bind(key.as_str())
            .fetch_optional(&mut *self.tx)
            .await?
            .as_ref()
            .map(transaction_from_row)
            .transpose()
    }

    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<TransactionRecord, TransferError> {
        let row = sqlx::query(
            r#"
            INSERT INTO transactions_tb
                (idempotency_key, sender_user_id, sender_name, receiver_user_id, receiver_name,
                 amount, sender_bank_id, sender_account_number, receiver_bank_id,
                 receiver_account_number, transfer_method, sender_ipa_address,
                 receiver_ipa_address, receiver_phone, receiver_card, receiver_iban,
                 status, currency, transaction_time)
            VALUES
                ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, NOW())
            RETURNING transaction_id, transaction_time
            "#,
        )
        .bind(&tx.idempotency_key)
        .bind(tx.sender_user_id)
        .bind(&tx.sender_name)
        .bind(tx.receiver_user_id)
        .bind(&tx.receiver_name)
        .bind(tx.amount.inner())
        .bind(tx.sender_account.bank_id)
        .bind(&tx.sender_account.account_number)
        .bind(tx.receiver_account.bank_id)
        .bind(&tx.receiver_account.account_number)
        .bind(tx.transfer_method.as_str())
        .bind(&tx.sender_ipa_address)
        .bind(&tx.receiver_ipa_address)
        .bind(&tx.receiver_phone)
        .bind(&tx.receiver_card)
        .bind(&tx.receiver_iban)
        .bind(&tx.status)
        .bind(&tx.currency)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                // a concurrent unit committed the same key; a retry replays it
                TransferError::ConcurrencyConflict("idempotency key already committed".into())
            } else {
                TransferError::from(e)
            }
        })?;

        Ok(tx
            .clone()
            .into_record(row.try_get("transaction_id")?, row.try_get("transaction_time")?))
    }

    async fn settle_money_request(
        &mut self,
        request_id: MoneyRequestId,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError> {
        let result = sqlx::query(
            r#"
            UPDATE money_requests_tb
            SET status = $1, transaction_id = $2, updated_at = NOW()
            WHERE request_id = $3 AND status = $4
            "#,
        )
        .bind(MoneyRequestStatus::Accepted.id())
        .bind(transaction_id)
        .bind(request_id)
        .bind(MoneyRequestStatus::Pending.id())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
