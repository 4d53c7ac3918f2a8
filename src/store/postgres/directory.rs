use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;
use sqlx::postgres::PgRow;

use super::{ACCOUNT_COLUMNS, PgStore, account_from_row};
use crate::core_types::{AccountKey, BankId, BankUserId, IpaId, UserId};
use crate::error::TransferError;
use crate::models::{BankAccount, Card, CardType, InstantPaymentAddress, PinHash, UserProfile};
use crate::store::DirectoryStore;

const IPA_COLUMNS: &str = "ipa_id, ipa_address, bank_id, account_number, user_id, pin, created_at";

const USER_COLUMNS: &str =
    "user_id, first_name, last_name, email, phone_number, default_account";

fn ipa_from_row(row: &PgRow) -> Result<InstantPaymentAddress, TransferError> {
    Ok(InstantPaymentAddress {
        ipa_id: row.try_get("ipa_id")?,
        ipa_address: row.try_get("ipa_address")?,
        key: AccountKey::new(
            row.try_get::<i32, _>("bank_id")?,
            row.try_get::<String, _>("account_number")?,
        ),
        user_id: row.try_get("user_id")?,
        pin_hash: PinHash::new(row.try_get::<String, _>("pin")?),
        created_at: row.try_get("created_at")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<UserProfile, TransferError> {
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        email: row.try_get("email")?,
        phone_number: row.try_get("phone_number")?,
        default_account: row.try_get("default_account")?,
    })
}

fn card_from_row(row: &PgRow) -> Result<Card, TransferError> {
    let card_type: String = row.try_get("card_type")?;
    Ok(Card {
        bank_id: row.try_get("bank_id")?,
        card_number: row.try_get("card_number")?,
        bank_user_id: row.try_get("bank_user_id")?,
        expiration_date: row.try_get::<NaiveDate, _>("expiration_date")?,
        pin_hash: row.try_get::<Option<String>, _>("pin")?.map(PinHash::new),
        card_type: CardType::parse(&card_type)
            .ok_or_else(|| TransferError::System(format!("unknown card type {}", card_type)))?,
    })
}

#[async_trait]
impl DirectoryStore for PgStore {
    async fn account(&self, key: &AccountKey) -> Result<Option<BankAccount>, TransferError> {
        let sql = format!(
            "SELECT {} FROM bank_accounts_tb WHERE bank_id = $1 AND account_number = $2",
            ACCOUNT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(key.bank_id)
            .bind(&key.account_number)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn account_by_iban(&self, iban: &str) -> Result<Option<BankAccount>, TransferError> {
        let sql = format!("SELECT {} FROM bank_accounts_tb WHERE iban = $1", ACCOUNT_COLUMNS);
        sqlx::query(&sql)
            .bind(iban)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(account_from_row)
            .transpose()
    }

    async fn accounts_for_bank_user(
        &self,
        bank_user_id: BankUserId,
        bank_id: BankId,
    ) -> Result<Vec<BankAccount>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM bank_accounts_tb
            WHERE bank_user_id = $1 AND bank_id = $2
            ORDER BY created_at, account_number
            "#,
            ACCOUNT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(bank_user_id)
            .bind(bank_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    async fn ipa_by_address(
        &self,
        address: &str,
    ) -> Result<Option<InstantPaymentAddress>, TransferError> {
        let sql = format!(
            "SELECT {} FROM instant_payment_addresses_tb WHERE ipa_address = $1",
            IPA_COLUMNS
        );
        sqlx::query(&sql)
            .bind(address)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(ipa_from_row)
            .transpose()
    }

    async fn ipa_by_id(
        &self,
        ipa_id: IpaId,
    ) -> Result<Option<InstantPaymentAddress>, TransferError> {
        let sql = format!(
            "SELECT {} FROM instant_payment_addresses_tb WHERE ipa_id = $1",
            IPA_COLUMNS
        );
        sqlx::query(&sql)
            .bind(ipa_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(ipa_from_row)
            .transpose()
    }

    async fn ipas_for_account(
        &self,
        key: &AccountKey,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError> {
        let sql = format!(
            r#"
            SELECT {} FROM instant_payment_addresses_tb
            WHERE bank_id = $1 AND account_number = $2
            ORDER BY ipa_id
            "#,
            IPA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(key.bank_id)
            .bind(&key.account_number)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ipa_from_row).collect()
    }

    async fn ipas_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError> {
        let sql = format!(
            "SELECT {} FROM instant_payment_addresses_tb WHERE user_id = $1 ORDER BY ipa_id",
            IPA_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(ipa_from_row).collect()
    }

    async fn user(&self, user_id: UserId) -> Result<Option<UserProfile>, TransferError> {
        let sql = format!("SELECT {} FROM users_tb WHERE user_id = $1", USER_COLUMNS);
        sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, TransferError> {
        let sql = format!("SELECT {} FROM users_tb WHERE phone_number = $1", USER_COLUMNS);
        sqlx::query(&sql)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn card(
        &self,
        bank_id: BankId,
        card_number: &str,
    ) -> Result<Option<Card>, TransferError> {
        sqlx::query(
            r#"
            SELECT bank_id, card_number, bank_user_id, expiration_date, pin, card_type
            FROM cards_tb
            WHERE bank_id = $1 AND card_number = $2
            "#,
        )
        .bind(bank_id)
        .bind(card_number)
        .fetch_optional(&self.pool)
        .await?
        .as_ref()
        .map(card_from_row)
        .transpose()
    }
}
