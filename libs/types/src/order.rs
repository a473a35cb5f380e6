//! Order lifecycle types
//!
//! An order moves PROGRESS → PARTIAL → COMPLETE as settlement applies fills,
//! or PROGRESS → FAILED before any fill. No transition leaves COMPLETE or
//! FAILED.

use crate::errors::OrderError;
use crate::ids::{OrderId, PairCode, PairId, UserId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

/// Order type
///
/// STOP_LOSS and TAKE_PROFIT are matched like LIMIT orders at their price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    TakeProfit,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Accepted, funds reserved, no fill yet
    Progress,
    /// At least one fill, quantity remaining
    Partial,
    /// Completely filled (terminal)
    Complete,
    /// Failed before any fill (terminal)
    Failed,
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Complete | OrderStatus::Failed)
    }
}

/// Order submission as received from the request-handling layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub pair_code: PairCode,
    pub quantity: Quantity,
    pub price: Price,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
}

impl OrderRequest {
    /// Amount of the funding asset debited when this order is accepted
    ///
    /// SELL reserves the primary asset quantity; BUY reserves
    /// `price × quantity` of the secondary asset.
    pub fn reservation_amount(&self) -> Option<Decimal> {
        reservation_amount(self.side, self.price, self.quantity)
    }
}

/// Amount debited from the funding wallet for an order of this shape
///
/// None when a BUY notional does not fit in a decimal.
pub fn reservation_amount(side: Side, price: Price, quantity: Quantity) -> Option<Decimal> {
    match side {
        Side::SELL => Some(quantity.as_decimal()),
        Side::BUY => price.notional(quantity),
    }
}

/// Complete order structure
///
/// Also the payload of the order channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub pair_id: PairId,
    pub side: Side,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub filled_quantity: Quantity,
    pub price: Price,
    pub status: OrderStatus,
    pub transaction_time: i64, // Unix nanos
}

impl Order {
    /// Create a new order awaiting matching
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        user_id: UserId,
        pair_id: PairId,
        side: Side,
        order_type: OrderType,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            pair_id,
            side,
            order_type,
            quantity,
            filled_quantity: Quantity::zero(),
            price,
            status: OrderStatus::Progress,
            transaction_time: timestamp,
        }
    }

    /// Quantity still open
    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity.checked_sub(self.filled_quantity).unwrap_or(Quantity::zero())
    }

    /// Check invariants: filled within bounds, COMPLETE iff fully filled
    pub fn check_invariant(&self) -> bool {
        self.filled_quantity <= self.quantity
            && ((self.status == OrderStatus::Complete) == (self.filled_quantity == self.quantity))
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled_quantity == self.quantity
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled_quantity.is_zero()
    }

    /// Apply a fill and advance the status
    ///
    /// Rejects fills on terminal orders and fills larger than the remaining
    /// quantity; on error the order is left untouched.
    pub fn apply_fill(&mut self, fill_quantity: Quantity) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::AlreadyTerminal { order_id: self.id, status: self.status });
        }
        if !fill_quantity.is_positive() {
            return Err(OrderError::InvalidQuantity(fill_quantity.to_string()));
        }

        let new_filled = self.filled_quantity.checked_add(fill_quantity);
        let Some(new_filled) = new_filled.filter(|filled| *filled <= self.quantity) else {
            return Err(OrderError::Overfill {
                order_id: self.id,
                quantity: self.quantity,
                filled: self.filled_quantity,
                fill: fill_quantity,
            });
        };

        self.filled_quantity = new_filled;
        self.status = if self.is_filled() { OrderStatus::Complete } else { OrderStatus::Partial };
        Ok(())
    }
}
