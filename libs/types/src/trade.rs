//! Trade execution types
//!
//! A trade is created by the matching engine and durably recorded by
//! settlement. It is the payload of the trade channel message.

use crate::ids::{OrderId, PairId, TradeId, UserId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Idempotency key of a trade
///
/// A taker order is matched against a given maker at most once (the taker is
/// a taker only during its own execution), so the pair identifies the match
/// even when the same order message is redelivered and re-executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TradeKey {
    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,
}

/// Immutable record of one match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub sequence: u64, // Per-book monotonic sequence
    pub pair_id: PairId,

    // Order references
    pub taker_order_id: OrderId,
    pub maker_order_id: OrderId,

    // Participants
    pub taker_user_id: UserId,
    pub maker_user_id: UserId,

    // Trade details (side is the taker's)
    pub side: Side,
    pub price: Price,
    pub quantity: Quantity,

    pub trade_time: i64, // Unix nanos
}

impl Trade {
    pub fn key(&self) -> TradeKey {
        TradeKey {
            taker_order_id: self.taker_order_id,
            maker_order_id: self.maker_order_id,
        }
    }

    /// Calculate trade value (price × quantity), None on overflow
    pub fn trade_value(&self) -> Option<Decimal> {
        self.price.notional(self.quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_trade() -> Trade {
        Trade {
            trade_id: TradeId::new(),
            sequence: 1,
            pair_id: PairId::new(1),
            taker_order_id: OrderId::new(2),
            maker_order_id: OrderId::new(1),
            taker_user_id: UserId::new(20),
            maker_user_id: UserId::new(10),
            side: Side::BUY,
            price: Price::from_u64(100),
            quantity: Quantity::from_u64(4),
            trade_time: 1708123456789000000,
        }
    }

    #[test]
    fn test_trade_value() {
        assert_eq!(create_trade().trade_value(), Some(Decimal::from(400)));
    }

    #[test]
    fn test_trade_key_ignores_trade_id() {
        let first = create_trade();
        let mut replayed = create_trade();
        replayed.sequence = 99;

        assert_ne!(first.trade_id, replayed.trade_id);
        assert_eq!(first.key(), replayed.key());
    }

    #[test]
    fn test_trade_batch_serialization() {
        let batch = vec![create_trade(), create_trade()];
        let json = serde_json::to_string(&batch).unwrap();
        let decoded: Vec<Trade> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, batch);
    }
}
