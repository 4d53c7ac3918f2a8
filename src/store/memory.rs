//! In-process store
//!
//! All tables live behind one `tokio::sync::Mutex`. A ledger unit takes the
//! lock as an owned guard for its whole lifetime and mutates a staged copy,
//! which replaces the live state only on commit. Units are therefore fully
//! serialized, and a dropped or failed unit leaves nothing behind.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    CredentialStore, DirectoryStore, LedgerStore, LedgerTx, MoneyRequestStore, SettingsStore,
};
use crate::core_types::{
    AccountKey, BankId, BankUserId, IdempotencyKey, IpaId, MoneyRequestId, TransactionId, UserId,
};
use crate::credentials::AuthContext;
use crate::error::TransferError;
use crate::ledger::{NewTransaction, TransactionRecord};
use crate::models::{
    AccountStatus, BankAccount, Card, CardType, InstantPaymentAddress, PinHash, UserProfile,
};
use crate::money::{Amount, MoneyError};
use crate::money_request::{MoneyRequest, MoneyRequestStatus, NewMoneyRequest};
use crate::policy::{SettingsPatch, SystemSettings};

#[derive(Debug, Clone, Default)]
struct State {
    users: BTreeMap<UserId, UserProfile>,
    accounts: BTreeMap<AccountKey, BankAccount>,
    /// Creation order of `accounts`
    account_order: Vec<AccountKey>,
    ipas: BTreeMap<IpaId, InstantPaymentAddress>,
    cards: BTreeMap<(BankId, String), Card>,
    settings: Option<SystemSettings>,
    transactions: BTreeMap<TransactionId, TransactionRecord>,
    /// (sender, idempotency key) -> transaction
    tx_by_key: HashMap<(UserId, String), TransactionId>,
    requests: BTreeMap<MoneyRequestId, MoneyRequest>,
    next_bank_user: BankUserId,
    next_ipa: IpaId,
    next_tx: TransactionId,
    next_request: MoneyRequestId,
}

impl State {
    fn account_mut(&mut self, key: &AccountKey) -> Result<&mut BankAccount, TransferError> {
        self.accounts
            .get_mut(key)
            .ok_or_else(|| TransferError::System(format!("account {} vanished", key)))
    }
}

/// Handle returned by [`MemoryStore::add_user`]
#[derive(Debug, Clone, Copy)]
pub struct SeededUser {
    pub user_id: UserId,
    pub bank_user: BankUserId,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Seeding ===

    /// Add an application user together with a bank customer of their own
    pub async fn add_user(
        &self,
        user_id: UserId,
        first_name: &str,
        last_name: &str,
        phone: Option<&str>,
    ) -> SeededUser {
        let mut s = self.state.lock().await;
        s.next_bank_user += 1;
        let bank_user = s.next_bank_user;
        s.users.insert(
            user_id,
            UserProfile {
                user_id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: None,
                phone_number: phone.map(str::to_string),
                default_account: None,
            },
        );
        SeededUser { user_id, bank_user }
    }

    pub async fn add_account(
        &self,
        key: AccountKey,
        bank_user_id: BankUserId,
        iban: &str,
        balance: Amount,
    ) {
        let mut s = self.state.lock().await;
        if !s.accounts.contains_key(&key) {
            s.account_order.push(key.clone());
        }
        s.accounts.insert(
            key.clone(),
            BankAccount {
                key,
                bank_user_id,
                iban: iban.to_string(),
                status: AccountStatus::Active,
                account_type: "current".to_string(),
                balance,
                created_at: Utc::now(),
            },
        );
    }

    pub async fn add_ipa(
        &self,
        address: &str,
        key: AccountKey,
        user_id: UserId,
        pin_hash: PinHash,
    ) -> IpaId {
        let mut s = self.state.lock().await;
        s.next_ipa += 1;
        let ipa_id = s.next_ipa;
        s.ipas.insert(
            ipa_id,
            InstantPaymentAddress {
                ipa_id,
                ipa_address: address.to_string(),
                key,
                user_id,
                pin_hash,
                created_at: Utc::now(),
            },
        );
        ipa_id
    }

    pub async fn set_default_account(&self, user_id: UserId, ipa_id: IpaId) {
        let mut s = self.state.lock().await;
        if let Some(user) = s.users.get_mut(&user_id) {
            user.default_account = Some(ipa_id);
        }
    }

    pub async fn add_card(
        &self,
        bank_id: BankId,
        card_number: &str,
        bank_user_id: BankUserId,
        pin_hash: Option<PinHash>,
    ) {
        let mut s = self.state.lock().await;
        s.cards.insert(
            (bank_id, card_number.to_string()),
            Card {
                bank_id,
                card_number: card_number.to_string(),
                bank_user_id,
                expiration_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or_default(),
                pin_hash,
                card_type: CardType::Debit,
            },
        );
    }

    pub async fn set_account_status(&self, key: &AccountKey, status: AccountStatus) {
        let mut s = self.state.lock().await;
        if let Some(account) = s.accounts.get_mut(key) {
            account.status = status;
        }
    }

    /// Move a request's creation time, e.g. to make it eligible for expiry
    pub async fn set_request_created_at(&self, request_id: MoneyRequestId, at: DateTime<Utc>) {
        let mut s = self.state.lock().await;
        if let Some(req) = s.requests.get_mut(&request_id) {
            req.created_at = at;
        }
    }

    // === Inspection ===

    pub async fn balance(&self, key: &AccountKey) -> Option<Amount> {
        self.state.lock().await.accounts.get(key).map(|a| a.balance)
    }

    pub async fn transaction_count(&self) -> usize {
        self.state.lock().await.transactions.len()
    }

    /// Sum over every account, for conservation checks
    pub async fn total_balance(&self) -> Result<Amount, MoneyError> {
        let s = self.state.lock().await;
        s.accounts
            .values()
            .try_fold(Amount::ZERO, |acc, a| acc.checked_add(a.balance))
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn account(&self, key: &AccountKey) -> Result<Option<BankAccount>, TransferError> {
        Ok(self.state.lock().await.accounts.get(key).cloned())
    }

    async fn account_by_iban(&self, iban: &str) -> Result<Option<BankAccount>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.accounts.values().find(|a| a.iban == iban).cloned())
    }

    async fn accounts_for_bank_user(
        &self,
        bank_user_id: BankUserId,
        bank_id: BankId,
    ) -> Result<Vec<BankAccount>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.account_order
            .iter()
            .filter_map(|k| s.accounts.get(k))
            .filter(|a| a.bank_user_id == bank_user_id && a.key.bank_id == bank_id)
            .cloned()
            .collect())
    }

    async fn ipa_by_address(
        &self,
        address: &str,
    ) -> Result<Option<InstantPaymentAddress>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.ipas.values().find(|i| i.ipa_address == address).cloned())
    }

    async fn ipa_by_id(
        &self,
        ipa_id: IpaId,
    ) -> Result<Option<InstantPaymentAddress>, TransferError> {
        Ok(self.state.lock().await.ipas.get(&ipa_id).cloned())
    }

    async fn ipas_for_account(
        &self,
        key: &AccountKey,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.ipas.values().filter(|i| &i.key == key).cloned().collect())
    }

    async fn ipas_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InstantPaymentAddress>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.ipas
            .values()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn user(&self, user_id: UserId) -> Result<Option<UserProfile>, TransferError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserProfile>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.users
            .values()
            .find(|u| u.phone_number.as_deref() == Some(phone))
            .cloned())
    }

    async fn card(
        &self,
        bank_id: BankId,
        card_number: &str,
    ) -> Result<Option<Card>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.cards.get(&(bank_id, card_number.to_string())).cloned())
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn pin_hash(&self, ctx: &AuthContext) -> Result<Option<PinHash>, TransferError> {
        let s = self.state.lock().await;
        Ok(match ctx {
            AuthContext::Ipa { address } => s
                .ipas
                .values()
                .find(|i| &i.ipa_address == address)
                .map(|i| i.pin_hash.clone()),
            AuthContext::Card {
                bank_id,
                card_number,
            } => s
                .cards
                .get(&(*bank_id, card_number.clone()))
                .and_then(|c| c.pin_hash.clone()),
        })
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load(&self) -> Result<Option<SystemSettings>, TransferError> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn insert_defaults(
        &self,
        defaults: &SystemSettings,
    ) -> Result<SystemSettings, TransferError> {
        let mut s = self.state.lock().await;
        Ok(s.settings.get_or_insert_with(|| defaults.clone()).clone())
    }

    async fn update(
        &self,
        patch: &SettingsPatch,
        updated_by: Option<UserId>,
    ) -> Result<SystemSettings, TransferError> {
        let mut s = self.state.lock().await;
        let settings = s.settings.get_or_insert_with(SystemSettings::default);
        patch.apply_to(settings);
        settings.updated_at = Some(Utc::now());
        if updated_by.is_some() {
            settings.updated_by = updated_by;
        }
        Ok(settings.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, TransferError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryTx { guard, staged }))
    }

    async fn transaction_by_key(
        &self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.tx_by_key
            .get(&(sender_user_id, key.as_str().to_string()))
            .and_then(|id| s.transactions.get(id))
            .cloned())
    }

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .get(&transaction_id)
            .cloned())
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let s = self.state.lock().await;
        Ok(s.transactions
            .values()
            .rev()
            .filter(|t| t.sender_user_id == user_id || t.receiver_user_id == Some(user_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Staged copy plus the guard that keeps every other unit out
struct MemoryTx {
    guard: OwnedMutexGuard<State>,
    staged: State,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_account(
        &mut self,
        key: &AccountKey,
    ) -> Result<Option<BankAccount>, TransferError> {
        Ok(self.staged.accounts.get(key).cloned())
    }

    async fn debit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError> {
        let account = self.staged.account_mut(key)?;
        if !account.is_active() {
            return Err(TransferError::AccountInactive(key.clone()));
        }
        let new_balance = account
            .balance
            .checked_sub(amount)
            .ok_or(TransferError::InsufficientFunds)?;
        account.balance = new_balance;
        Ok(new_balance)
    }

    async fn credit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError> {
        let account = self.staged.account_mut(key)?;
        if !account.is_active() {
            return Err(TransferError::AccountInactive(key.clone()));
        }
        let new_balance = account.balance.checked_add(amount)?;
        account.balance = new_balance;
        Ok(new_balance)
    }

    async fn transaction_by_key(
        &mut self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        Ok(self
            .staged
            .tx_by_key
            .get(&(sender_user_id, key.as_str().to_string()))
            .and_then(|id| self.staged.transactions.get(id))
            .cloned())
    }

    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<TransactionRecord, TransferError> {
        let scoped = (tx.sender_user_id, tx.idempotency_key.clone());
        if self.staged.tx_by_key.contains_key(&scoped) {
            return Err(TransferError::ConcurrencyConflict(
                "idempotency key already committed".into(),
            ));
        }
        self.staged.next_tx += 1;
        let id = self.staged.next_tx;
        let record = tx.clone().into_record(id, Utc::now());
        self.staged.tx_by_key.insert(scoped, id);
        self.staged.transactions.insert(id, record.clone());
        Ok(record)
    }

    async fn settle_money_request(
        &mut self,
        request_id: MoneyRequestId,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError> {
        match self.staged.requests.get_mut(&request_id) {
            Some(req) if req.status == MoneyRequestStatus::Pending => {
                req.status = MoneyRequestStatus::Accepted;
                req.transaction_id = Some(transaction_id);
                req.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        let MemoryTx { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        Ok(())
    }
}

#[async_trait]
impl MoneyRequestStore for MemoryStore {
    async fn insert(&self, request: &NewMoneyRequest) -> Result<MoneyRequest, TransferError> {
        let mut s = self.state.lock().await;
        s.next_request += 1;
        let now = Utc::now();
        let stored = MoneyRequest {
            request_id: s.next_request,
            requester_user_id: request.requester_user_id,
            requester_name: request.requester_name.clone(),
            requested_user_id: request.requested_user_id,
            requested_name: request.requested_name.clone(),
            amount: request.amount,
            requester_ipa_address: request.requester_ipa_address.clone(),
            requested_ipa_address: request.requested_ipa_address.clone(),
            message: request.message.clone(),
            status: MoneyRequestStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        };
        s.requests.insert(stored.request_id, stored.clone());
        Ok(stored)
    }

    async fn get(
        &self,
        request_id: MoneyRequestId,
    ) -> Result<Option<MoneyRequest>, TransferError> {
        Ok(self.state.lock().await.requests.get(&request_id).cloned())
    }

    async fn pending_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError> {
        let s = self.state.lock().await;
        Ok(newest_first(s.requests.values().filter(|r| {
            r.requested_user_id == user_id && r.status == MoneyRequestStatus::Pending
        })))
    }

    async fn all_for_user(&self, user_id: UserId) -> Result<Vec<MoneyRequest>, TransferError> {
        let s = self.state.lock().await;
        Ok(newest_first(s.requests.values().filter(|r| {
            r.requested_user_id == user_id || r.requester_user_id == user_id
        })))
    }

    async fn transition(
        &self,
        request_id: MoneyRequestId,
        from: MoneyRequestStatus,
        to: MoneyRequestStatus,
    ) -> Result<bool, TransferError> {
        let mut s = self.state.lock().await;
        match s.requests.get_mut(&request_id) {
            Some(req) if req.status == from => {
                req.status = to;
                req.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MoneyRequest>, TransferError> {
        let mut s = self.state.lock().await;
        let now = Utc::now();
        let mut expired = Vec::new();
        for req in s.requests.values_mut() {
            if req.status == MoneyRequestStatus::Pending && req.created_at < cutoff {
                req.status = MoneyRequestStatus::Expired;
                req.updated_at = now;
                expired.push(req.clone());
            }
        }
        Ok(expired)
    }
}

fn newest_first<'a>(it: impl Iterator<Item = &'a MoneyRequest>) -> Vec<MoneyRequest> {
    let mut out: Vec<MoneyRequest> = it.cloned().collect();
    out.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then(b.request_id.cmp(&a.request_id))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let u = store.add_user(1, "Amr", "Saleh", None).await;
        store
            .add_account(AccountKey::new(1, "1001"), u.bank_user, "EG1", Amount::from_units(100))
            .await;
        store
            .add_account(AccountKey::new(1, "1002"), u.bank_user, "EG2", Amount::ZERO)
            .await;
        store
    }

    #[tokio::test]
    async fn test_dropped_unit_leaves_no_trace() {
        let store = seeded().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.debit(&AccountKey::new(1, "1001"), Amount::from_units(40))
                .await
                .unwrap();
        }
        assert_eq!(
            store.balance(&AccountKey::new(1, "1001")).await,
            Some(Amount::from_units(100))
        );
    }

    #[tokio::test]
    async fn test_commit_publishes_staged_state() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        let left = tx
            .debit(&AccountKey::new(1, "1001"), Amount::from_units(40))
            .await
            .unwrap();
        let right = tx
            .credit(&AccountKey::new(1, "1002"), Amount::from_units(40))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(left, Amount::from_units(60));
        assert_eq!(right, Amount::from_units(40));
        assert_eq!(store.total_balance().await.unwrap(), Amount::from_units(100));
    }

    #[tokio::test]
    async fn test_total_balance_reports_overflow() {
        let store = seeded().await;
        let u = store.add_user(2, "Mona", "Fahmy", None).await;
        // two of these exceed Decimal::MAX
        let huge = Amount::new(Decimal::from_str("40000000000000000000000000000").unwrap()).unwrap();
        for (n, iban) in [("2001", "EG3"), ("2002", "EG4")] {
            store
                .add_account(AccountKey::new(2, n), u.bank_user, iban, huge)
                .await;
        }
        assert_eq!(store.total_balance().await, Err(MoneyError::Overflow));
    }

    #[tokio::test]
    async fn test_debit_guards() {
        let store = seeded().await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.debit(&AccountKey::new(1, "1001"), Amount::from_minor(10_001))
                .await
                .unwrap_err(),
            TransferError::InsufficientFunds
        );
        drop(tx);

        store
            .set_account_status(&AccountKey::new(1, "1001"), AccountStatus::Inactive)
            .await;
        let mut tx = store.begin().await.unwrap();
        assert_eq!(
            tx.debit(&AccountKey::new(1, "1001"), Amount::from_units(1))
                .await
                .unwrap_err()
                .code(),
            "ACCOUNT_INACTIVE"
        );
    }

    #[tokio::test]
    async fn test_accounts_keep_creation_order() {
        let store = MemoryStore::new();
        store
            .add_account(AccountKey::new(1, "9"), 5, "EGa", Amount::ZERO)
            .await;
        store
            .add_account(AccountKey::new(1, "1"), 5, "EGb", Amount::ZERO)
            .await;
        let accounts = store.accounts_for_bank_user(5, 1).await.unwrap();
        let numbers: Vec<_> = accounts.iter().map(|a| a.key.account_number.as_str()).collect();
        assert_eq!(numbers, vec!["9", "1"]);
    }
}
