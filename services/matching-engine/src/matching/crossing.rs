//! Crossing detection logic
//!
//! Determines whether an incoming order may trade against a resting price.

use types::numeric::Price;
use types::order::{Order, OrderType, Side};

/// Worst resting price an incoming order accepts, `None` when unbounded
///
/// LIMIT, STOP_LOSS and TAKE_PROFIT orders are bounded by their price. A
/// MARKET SELL takes any bid. A MARKET BUY stays bounded by its submitted
/// price because that is the rate its funds were reserved at.
pub fn price_limit(order: &Order) -> Option<Price> {
    match (order.order_type, order.side) {
        (OrderType::Market, Side::SELL) => None,
        _ => Some(order.price),
    }
}

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming order with `limit` crosses a resting price
pub fn incoming_can_match(incoming_side: Side, limit: Option<Price>, resting_price: Price) -> bool {
    let Some(limit) = limit else {
        return true;
    };
    match incoming_side {
        Side::BUY => can_match(limit, resting_price),
        Side::SELL => can_match(resting_price, limit),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{OrderId, PairId, UserId};
    use types::numeric::Quantity;

    fn order(side: Side, order_type: OrderType, price: u64) -> Order {
        Order::new(
            OrderId::new(1),
            UserId::new(1),
            PairId::new(1),
            side,
            order_type,
            Price::from_u64(price),
            Quantity::from_u64(1),
            0,
        )
    }

    #[test]
    fn test_can_match() {
        assert!(can_match(Price::from_u64(50000), Price::from_u64(49000)));
        assert!(can_match(Price::from_u64(50000), Price::from_u64(50000)));
        assert!(!can_match(Price::from_u64(49000), Price::from_u64(50000)));
    }

    #[test]
    fn test_incoming_buy_limit() {
        let limit = Some(Price::from_u64(100));
        assert!(incoming_can_match(Side::BUY, limit, Price::from_u64(99)));
        assert!(incoming_can_match(Side::BUY, limit, Price::from_u64(100)));
        assert!(!incoming_can_match(Side::BUY, limit, Price::from_u64(101)));
    }

    #[test]
    fn test_incoming_sell_limit() {
        let limit = Some(Price::from_u64(100));
        assert!(incoming_can_match(Side::SELL, limit, Price::from_u64(101)));
        assert!(!incoming_can_match(Side::SELL, limit, Price::from_u64(99)));
    }

    #[test]
    fn test_market_sell_is_unbounded() {
        let sell = order(Side::SELL, OrderType::Market, 100);
        assert_eq!(price_limit(&sell), None);
        assert!(incoming_can_match(Side::SELL, None, Price::from_u64(1)));
    }

    #[test]
    fn test_market_buy_bounded_by_reserved_price() {
        let buy = order(Side::BUY, OrderType::Market, 100);
        assert_eq!(price_limit(&buy), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_stop_orders_behave_as_limit() {
        for order_type in [OrderType::StopLoss, OrderType::TakeProfit, OrderType::Limit] {
            let sell = order(Side::SELL, order_type, 100);
            assert_eq!(price_limit(&sell), Some(Price::from_u64(100)));
        }
    }
}
