//! transfer_core - Money-Transfer Core
//!
//! Moves money between bank accounts for an instant-payment backend: resolves
//! the receiver from one of five addressing schemes, applies the system-wide
//! policy switches, checks the sender's PIN and commits debit, credit and the
//! transaction row as one atomic unit.
//!
//! # Modules
//!
//! - [`core_types`] - Ids, `AccountKey`, `IdempotencyKey`
//! - [`money`] - Fixed-point `Amount`
//! - [`models`] - Accounts, payment addresses, cards, users
//! - [`error`] - `TransferError` with stable machine codes
//! - [`directory`] - Receiver and funding account resolution
//! - [`policy`] - System settings, cache and the policy gate
//! - [`credentials`] - PIN hashing and verification
//! - [`ledger`] - The atomic transfer unit
//! - [`money_request`] - Request / accept / decline / expire
//! - [`notify`] - Best-effort notifications
//! - [`transfer`] - The send-money pipeline
//! - [`service`] - `PaymentCore`, the entry point for the HTTP layer
//! - [`store`] - Repository traits, PostgreSQL and in-memory backends
//! - [`worker`] - Money request expiry sweeper

// Core types - must be first!
pub mod core_types;
pub mod error;
pub mod models;
pub mod money;

// Components
pub mod credentials;
pub mod directory;
pub mod ledger;
pub mod money_request;
pub mod notify;
pub mod policy;
pub mod transfer;

// Wiring
pub mod service;
pub mod store;
pub mod worker;

// Runtime
pub mod config;
pub mod db;
pub mod logging;

// Convenient re-exports at crate root
pub use core_types::{AccountKey, IdempotencyKey, MoneyRequestId, TransactionId, UserId};
pub use credentials::{AuthContext, CredentialVerifier, HashedPinVerifier, Pin};
pub use directory::{AccountDirectory, FundingSource, Recipient, TransferMethod};
pub use error::{ErrorBody, TransferError};
pub use ledger::{LedgerEngine, TransactionRecord, TransferOrder, TransferOutcome};
pub use money::Amount;
pub use money_request::{MoneyRequest, MoneyRequestStatus, MoneyRequestWorkflow};
pub use notify::{NotificationDispatcher, TransferNotice};
pub use policy::{PolicyGate, PublicStatus, SettingsPatch, SystemSettings};
pub use service::PaymentCore;
pub use transfer::{SendMoney, TransferReceipt};
