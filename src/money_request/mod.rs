//! Money requests: one user asks another for an amount, the other pays or refuses.

mod state;
mod types;
mod workflow;

pub use state::MoneyRequestStatus;
pub use types::{
    CreateMoneyRequest, MAX_MESSAGE_LEN, MoneyRequest, MoneyRequestAction, MoneyRequestEvent,
    NewMoneyRequest,
};
pub use workflow::MoneyRequestWorkflow;
