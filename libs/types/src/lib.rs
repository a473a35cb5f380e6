//! Types library for the exchange transaction core
//!
//! Core type definitions shared by Order Intake, the Matching Engine and the
//! Settlement Coordinator. Everything that crosses a process boundary (the
//! order and trade channel messages) is defined here so every service agrees
//! on the wire shape.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, UserId, PairId, AssetId, TradeId, PairCode)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Order lifecycle types and the status state machine
//! - `trade`: Trade execution types
//! - `pair`: Trading pair reference data
//! - `account`: Users and wallets
//! - `errors`: Error taxonomy
//! - `time`: Timestamp helpers

pub mod account;
pub mod errors;
pub mod ids;
pub mod numeric;
pub mod order;
pub mod pair;
pub mod time;
pub mod trade;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::pair::*;
    pub use crate::trade::*;
}
