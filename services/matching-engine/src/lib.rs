//! Matching Engine Service
//!
//! Price-time priority matching, one order book per trading pair.
//!
//! **Key Invariants:**
//! - Bids sorted descending, asks ascending, FIFO within a price
//! - Trades execute at the maker's price
//! - Orders for one pair are executed strictly sequentially
//! - Conservation of quantity: a trade never exceeds either side's remainder
//!
//! `engine` holds the pure book; `service` wraps each book in an actor task
//! fed from the order channel.

pub mod book;
pub mod engine;
pub mod execution_log;
pub mod matching;
pub mod service;

pub use engine::{EngineError, OrderBook};
pub use service::{MatchingConfig, MatchingService};
