//! Outbox entries
//!
//! A message staged inside a store transaction. The relay publishes pending
//! entries in `sequence` order and marks each dispatched afterwards, so a
//! crash between publish and mark produces a duplicate, never a loss.

/// A committed message awaiting publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    /// Commit-order position, unique per store
    pub sequence: u64,
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub created_at: i64, // Unix nanos
}
