//! Matching logic module
//!
//! Implements price-time priority matching algorithm

pub mod crossing;
pub mod executor;

pub use crossing::{can_match, incoming_can_match, price_limit};
pub use executor::MatchExecutor;
