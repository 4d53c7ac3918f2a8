//! Send Money
//!
//! [`TransferPipeline`] runs one transfer attempt end to end;
//! [`TransferService`] is the direct "send money" entry point on top of it.

mod pipeline;
mod send;

pub use pipeline::{TransferPipeline, TransferRequest};
pub use send::{SendMoney, TransferReceipt, TransferService};
