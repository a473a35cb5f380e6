//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at one price. Orders are kept
//! in arrival order so the oldest order at the best price always fills first.

use std::collections::VecDeque;
use types::errors::OrderError;
use types::ids::OrderId;
use types::numeric::Quantity;
use types::order::Order;

/// Resting orders at a single price, oldest first
#[derive(Debug, Clone)]
pub struct PriceLevel {
    orders: VecDeque<Order>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self { orders: VecDeque::new() }
    }

    /// Append an order behind everything already at this price
    pub fn push_back(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Oldest order at this price
    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Fill the front order by `quantity`
    ///
    /// Returns the front order once it is fully filled (it leaves the queue),
    /// `None` while it still rests.
    pub fn fill_front(&mut self, quantity: Quantity) -> Result<Option<Order>, OrderError> {
        let Some(front) = self.orders.front_mut() else {
            return Ok(None);
        };
        front.apply_fill(quantity)?;

        if front.is_filled() {
            Ok(self.orders.pop_front())
        } else {
            Ok(None)
        }
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|order| order.id == order_id)
    }

    /// Orders in time priority
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Remaining quantity over the queue, clamped at the decimal range
    pub fn total_quantity(&self) -> Quantity {
        self.orders
            .iter()
            .fold(Quantity::zero(), |total, order| total.saturating_add(order.remaining_quantity()))
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}
