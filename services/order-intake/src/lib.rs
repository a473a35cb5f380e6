//! Order Intake
//!
//! Accepts an order only after its funds are reserved. The debit, the
//! persisted order and the outbox entry that announces it to the matching
//! engine commit in one store transaction while the user's funding wallet
//! is locked; the outbox relay then publishes committed entries in order.

pub mod error;
pub mod intake;
pub mod outbox;

pub use error::{IntakeError, RelayError};
pub use intake::{IntakeConfig, OrderIntake};
pub use outbox::{OutboxConfig, OutboxRelay};
