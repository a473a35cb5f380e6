//! Execution log
//!
//! Bounded window of recently executed orders and the trades each produced.
//! The channel delivers at least once, so an order can come back after the
//! book already matched it; the log lets the book answer with the original
//! trades instead of matching the order a second time.
//!
//! The window is the bound on that guarantee. A fully filled order that
//! comes back after `capacity` later executions have evicted it is matched
//! again against whatever rests at that point; settlement then rejects the
//! resulting trades as fills on a COMPLETE order while the book has already
//! consumed those makers. Size the capacity above the longest redelivery
//! backlog the channel can build up for one pair.

use std::collections::{HashMap, VecDeque};
use types::ids::OrderId;
use types::trade::Trade;

/// Default number of executions remembered per book
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct ExecutionLog {
    capacity: usize,
    /// Insertion order, oldest first, for eviction
    recent: VecDeque<OrderId>,
    trades: HashMap<OrderId, Vec<Trade>>,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            recent: VecDeque::with_capacity(capacity),
            trades: HashMap::with_capacity(capacity),
        }
    }

    /// Trades produced when `order_id` was executed, if still in the window
    pub fn get(&self, order_id: OrderId) -> Option<&[Trade]> {
        self.trades.get(&order_id).map(Vec::as_slice)
    }

    pub fn record(&mut self, order_id: OrderId, trades: Vec<Trade>) {
        if self.trades.insert(order_id, trades).is_some() {
            return;
        }
        if self.recent.len() >= self.capacity {
            if let Some(evicted) = self.recent.pop_front() {
                self.trades.remove(&evicted);
            }
        }
        self.recent.push_back(order_id);
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_get() {
        let mut log = ExecutionLog::new(4);
        log.record(OrderId::new(1), Vec::new());

        assert_eq!(log.get(OrderId::new(1)), Some(&[][..]));
        assert!(log.get(OrderId::new(2)).is_none());
    }

    #[test]
    fn test_window_eviction() {
        let mut log = ExecutionLog::new(3);
        for id in 1..=4 {
            log.record(OrderId::new(id), Vec::new());
        }

        // Oldest entry evicted once the window is full
        assert_eq!(log.len(), 3);
        assert!(log.get(OrderId::new(1)).is_none());
        assert!(log.get(OrderId::new(4)).is_some());
    }

    #[test]
    fn test_rerecord_does_not_grow_window() {
        let mut log = ExecutionLog::new(2);
        log.record(OrderId::new(1), Vec::new());
        log.record(OrderId::new(1), Vec::new());
        log.record(OrderId::new(2), Vec::new());

        assert_eq!(log.len(), 2);
        assert!(log.get(OrderId::new(1)).is_some());
    }
}
