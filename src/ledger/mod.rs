//! Ledger: the atomic balance mutation plus the append-only transaction log.

mod engine;
mod types;

pub use engine::LedgerEngine;
pub use types::{
    NewTransaction, STATUS_COMPLETED, TransactionRecord, TransferOrder, TransferOutcome,
};
