//! Settlement Coordinator
//!
//! Applies each trade to both orders and to both users' wallets exactly once.
//! Every settlement takes its whole lock set up front, in the global
//! [`lock_service::LockKey`] order, so concurrent settlements that touch the
//! same orders or wallets never wait on each other in a cycle.

pub mod coordinator;
pub mod error;
pub mod locks;
pub mod service;

pub use coordinator::{SettleOutcome, SettlementCoordinator};
pub use error::SettlementError;
pub use locks::settlement_lock_keys;
pub use service::{SettlementConfig, SettlementService};
