//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).
//! BTreeMap keeps iteration deterministic.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::Order;

use super::price_level::PriceLevel;

/// Ask (sell) side order book
///
/// The lowest price is best. At each price level, orders are FIFO.
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rest an order at the back of its price level
    pub fn insert(&mut self, order: Order) {
        self.levels.entry(order.price).or_default().push_back(order);
    }

    pub fn get(&self, order_id: OrderId, price: Price) -> Option<&Order> {
        self.levels.get(&price)?.get(order_id)
    }

    /// Best ask (lowest price) and the quantity resting there
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    pub(crate) fn best_ask_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels.iter_mut().next().map(|(price, level)| (*price, level))
    }

    /// Drop the level at `price` if nothing rests there any more
    pub(crate) fn prune_level(&mut self, price: Price) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
        }
    }

    /// Top `depth` levels, best first
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| (*price, level.total_quantity()))
            .collect()
    }

    /// Every resting order in matching priority
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.levels.values().flat_map(PriceLevel::iter)
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{PairId, UserId};
    use types::order::{OrderType, Side};

    fn create_test_order(id: u64, price_val: u64, qty_str: &str) -> Order {
        Order::new(
            OrderId::new(id),
            UserId::new(1),
            PairId::new(1),
            Side::SELL,
            OrderType::Limit,
            Price::from_u64(price_val),
            qty_str.parse().unwrap(),
            1708123456789000000,
        )
    }

    #[test]
    fn test_ask_book_best_ask() {
        let mut book = AskBook::new();
        book.insert(create_test_order(1, 50000, "1.0"));
        book.insert(create_test_order(2, 51000, "2.0"));
        book.insert(create_test_order(3, 49000, "1.5"));

        let (best_price, best_qty) = book.best_ask().unwrap();
        assert_eq!(best_price, Price::from_u64(49000));
        assert_eq!(best_qty, "1.5".parse().unwrap());
    }

    #[test]
    fn test_ask_book_depth_snapshot() {
        let mut book = AskBook::new();
        book.insert(create_test_order(1, 50000, "1.0"));
        book.insert(create_test_order(2, 51000, "2.0"));
        book.insert(create_test_order(3, 49000, "1.5"));
        book.insert(create_test_order(4, 52000, "0.5"));

        let depth = book.depth_snapshot(2);
        assert_eq!(depth.len(), 2);
        assert_eq!(depth[0].0, Price::from_u64(49000));
        assert_eq!(depth[1].0, Price::from_u64(50000));
    }

    #[test]
    fn test_ask_book_price_time_priority() {
        let mut book = AskBook::new();
        book.insert(create_test_order(1, 50000, "1.0"));
        book.insert(create_test_order(2, 50000, "2.0"));

        assert_eq!(book.depth_snapshot(10).len(), 1);
        let (price, total_qty) = book.best_ask().unwrap();
        assert_eq!(price, Price::from_u64(50000));
        assert_eq!(total_qty, "3.0".parse().unwrap());

        let ids: Vec<u64> = book.orders().map(|o| o.id.value()).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
