//! Shared fixtures and test doubles for the integration tests.
//!
//! Seeded world:
//! - user 1 "Amr Saleh", IPA `a@bank` (PIN 1234) on bank 1 account, balance 1000.00,
//!   debit card `5222222222221001` (PIN 4321) on the same account
//! - user 2 "Mona Fahmy", IPA `b@bank` (PIN 5678) on bank 2 account, balance 200.00,
//!   debit card `4111111111112001`, phone `01000000002`

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use transfer_core::config::TransferConfig;
use transfer_core::core_types::{AccountKey, IdempotencyKey, MoneyRequestId, TransactionId, UserId};
use transfer_core::credentials::{
    AuthContext, CredentialVerifier, HashedPinVerifier, Pin, PinHasher,
};
use transfer_core::directory::Recipient;
use transfer_core::error::TransferError;
use transfer_core::ledger::{NewTransaction, TransactionRecord};
use transfer_core::models::{BankAccount, PinHash};
use transfer_core::money::Amount;
use transfer_core::money_request::MoneyRequestEvent;
use transfer_core::notify::{NotificationDispatcher, TransferNotice};
use transfer_core::service::PaymentCore;
use transfer_core::store::memory::MemoryStore;
use transfer_core::store::{LedgerStore, LedgerTx, Stores};
use transfer_core::transfer::SendMoney;

pub const USER_A: UserId = 1;
pub const USER_B: UserId = 2;
pub const PIN_A: &str = "1234";
pub const PIN_B: &str = "5678";
pub const CARD_PIN_A: &str = "4321";
pub const CARD_A: &str = "5222222222221001";
pub const CARD_B: &str = "4111111111112001";
pub const PHONE_B: &str = "01000000002";
pub const IBAN_A: &str = "EG380001000100000000100001001";
pub const IBAN_B: &str = "EG380002000200000000200002001";

pub fn acct_a() -> AccountKey {
    AccountKey::new(1, "100000001001")
}

pub fn acct_b() -> AccountKey {
    AccountKey::new(2, "200000002001")
}

pub fn units(n: u64) -> Amount {
    Amount::from_units(n)
}

/// argon2id at the lowest cost, so tests stay fast
pub fn cheap_hash(pin: &str) -> PinHash {
    PinHasher::with_cost(8, 1, 1)
        .unwrap()
        .hash(&Pin::new(pin))
        .unwrap()
}

pub async fn seed() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());

    let a = store.add_user(USER_A, "Amr", "Saleh", Some("01000000001")).await;
    store.add_account(acct_a(), a.bank_user, IBAN_A, units(1000)).await;
    let ipa_a = store
        .add_ipa("a@bank", acct_a(), USER_A, cheap_hash(PIN_A))
        .await;
    store.set_default_account(USER_A, ipa_a).await;
    store
        .add_card(1, CARD_A, a.bank_user, Some(cheap_hash(CARD_PIN_A)))
        .await;

    let b = store.add_user(USER_B, "Mona", "Fahmy", Some(PHONE_B)).await;
    store.add_account(acct_b(), b.bank_user, IBAN_B, units(200)).await;
    let ipa_b = store
        .add_ipa("b@bank", acct_b(), USER_B, cheap_hash(PIN_B))
        .await;
    store.set_default_account(USER_B, ipa_b).await;
    store.add_card(2, CARD_B, b.bank_user, None).await;

    store
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub core: PaymentCore,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    /// Real argon2 PINs, recording notifier, healthy ledger
    pub async fn new() -> Self {
        let store = seed().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let core = PaymentCore::with_hashed_pins(
            Stores::from_shared(store.clone()),
            notifier.clone(),
            &TransferConfig::default(),
        );
        Self {
            store,
            core,
            notifier,
        }
    }

    pub async fn with_verifier(verifier: Arc<dyn CredentialVerifier>) -> Self {
        let store = seed().await;
        let notifier = Arc::new(RecordingNotifier::default());
        let core = PaymentCore::new(
            Stores::from_shared(store.clone()),
            verifier,
            notifier.clone(),
            &TransferConfig::default(),
        );
        Self {
            store,
            core,
            notifier,
        }
    }
}

pub fn hashed_verifier(store: &Arc<MemoryStore>) -> Arc<dyn CredentialVerifier> {
    Arc::new(HashedPinVerifier::new(store.clone()))
}

pub fn send(sender: UserId, recipient: Recipient, amount: Amount, pin: &str) -> SendMoney {
    SendMoney {
        sender_user_id: sender,
        recipient,
        amount,
        pin: Pin::new(pin),
        idempotency_key: Some(IdempotencyKey::generate()),
        source: None,
    }
}

pub fn to_ipa(address: &str) -> Recipient {
    Recipient::Ipa {
        address: address.to_string(),
    }
}

// ============================================================================
// Verifier doubles
// ============================================================================

/// Delegates to a real verifier and records every context it was asked about
pub struct CountingVerifier {
    inner: Arc<dyn CredentialVerifier>,
    calls: Mutex<Vec<AuthContext>>,
}

impl CountingVerifier {
    pub fn new(inner: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AuthContext> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialVerifier for CountingVerifier {
    async fn verify(&self, ctx: &AuthContext, pin: &Pin) -> Result<(), TransferError> {
        self.calls.lock().unwrap().push(ctx.clone());
        self.inner.verify(ctx, pin).await
    }
}

/// Fails the test if the pipeline ever reaches PIN verification
pub struct NeverCalledVerifier;

#[async_trait]
impl CredentialVerifier for NeverCalledVerifier {
    async fn verify(&self, ctx: &AuthContext, _pin: &Pin) -> Result<(), TransferError> {
        panic!("PIN verification must not run, was asked for {}", ctx);
    }
}

// ============================================================================
// Notifier doubles
// ============================================================================

#[derive(Default)]
pub struct RecordingNotifier {
    transfers: Mutex<Vec<TransferNotice>>,
    requests: Mutex<Vec<MoneyRequestEvent>>,
}

impl RecordingNotifier {
    pub fn transfers(&self) -> Vec<TransferNotice> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn request_events(&self) -> Vec<MoneyRequestEvent> {
        self.requests.lock().unwrap().clone()
    }

    /// Delivery runs on spawned tasks; poll until `n` transfer notices arrived
    pub async fn wait_for_transfers(&self, n: usize) -> Vec<TransferNotice> {
        for _ in 0..200 {
            let seen = self.transfers();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.transfers()
    }

    pub async fn wait_for_request_events(&self, n: usize) -> Vec<MoneyRequestEvent> {
        for _ in 0..200 {
            let seen = self.request_events();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.request_events()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify_transfer_completed(&self, notice: &TransferNotice) -> anyhow::Result<()> {
        self.transfers.lock().unwrap().push(notice.clone());
        Ok(())
    }

    async fn notify_money_request(&self, event: &MoneyRequestEvent) -> anyhow::Result<()> {
        self.requests.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Every delivery fails
pub struct FailingNotifier {
    pub attempts: AtomicUsize,
}

impl FailingNotifier {
    pub fn new() -> Self {
        Self {
            attempts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify_transfer_completed(&self, _: &TransferNotice) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("push gateway unreachable")
    }

    async fn notify_money_request(&self, _: &MoneyRequestEvent) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("push gateway unreachable")
    }
}

// ============================================================================
// Fault-injecting ledger
// ============================================================================

/// Crashes every ledger unit between the debit and the credit
pub struct CrashAfterDebit {
    inner: Arc<MemoryStore>,
}

impl CrashAfterDebit {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LedgerStore for CrashAfterDebit {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>, TransferError> {
        Ok(Box::new(CrashingTx {
            inner: self.inner.begin().await?,
        }))
    }

    async fn transaction_by_key(
        &self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        self.inner.transaction_by_key(sender_user_id, key).await
    }

    async fn transaction(
        &self,
        transaction_id: TransactionId,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        self.inner.transaction(transaction_id).await
    }

    async fn transactions_for_user(
        &self,
        user_id: UserId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        self.inner.transactions_for_user(user_id, limit).await
    }
}

struct CrashingTx {
    inner: Box<dyn LedgerTx>,
}

#[async_trait]
impl LedgerTx for CrashingTx {
    async fn lock_account(
        &mut self,
        key: &AccountKey,
    ) -> Result<Option<BankAccount>, TransferError> {
        self.inner.lock_account(key).await
    }

    async fn debit(&mut self, key: &AccountKey, amount: Amount) -> Result<Amount, TransferError> {
        self.inner.debit(key, amount).await
    }

    async fn credit(&mut self, _key: &AccountKey, _amount: Amount) -> Result<Amount, TransferError> {
        Err(TransferError::System("injected crash after debit".into()))
    }

    async fn transaction_by_key(
        &mut self,
        sender_user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<TransactionRecord>, TransferError> {
        self.inner.transaction_by_key(sender_user_id, key).await
    }

    async fn insert_transaction(
        &mut self,
        tx: &NewTransaction,
    ) -> Result<TransactionRecord, TransferError> {
        self.inner.insert_transaction(tx).await
    }

    async fn settle_money_request(
        &mut self,
        request_id: MoneyRequestId,
        transaction_id: TransactionId,
    ) -> Result<bool, TransferError> {
        self.inner
            .settle_money_request(request_id, transaction_id)
            .await
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        self.inner.rollback().await
    }
}
