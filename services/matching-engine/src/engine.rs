//! Matching engine core
//!
//! One `OrderBook` per trading pair. The book is a plain single-owner value:
//! whoever holds it executes orders strictly one after another, which is
//! what keeps matching deterministic.

use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};
use types::errors::{Classify, ErrorClass, OrderError};
use types::ids::{OrderId, PairId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderStatus, Side};
use types::time::unix_nanos_now;
use types::trade::Trade;

use crate::book::{AskBook, BidBook, PriceLevel};
use crate::execution_log::{ExecutionLog, DEFAULT_LOG_CAPACITY};
use crate::matching::{crossing, MatchExecutor};

/// Engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("order {order_id} belongs to pair {got}, book trades pair {expected}")]
    WrongPair {
        order_id: OrderId,
        expected: PairId,
        got: PairId,
    },

    #[error("order {0} has nothing left to match")]
    NothingRemaining(OrderId),

    #[error("order {order_id} is already {status:?}")]
    TerminalOrder { order_id: OrderId, status: OrderStatus },

    #[error("order {0} is already resting in the book")]
    DuplicateOrder(OrderId),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl Classify for EngineError {
    fn class(&self) -> ErrorClass {
        match self {
            EngineError::Order(_) => ErrorClass::Fatal,
            _ => ErrorClass::Validation,
        }
    }
}

/// Top-of-book view for monitoring and tests
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSnapshot {
    pub pair_id: PairId,
    pub bids: Vec<(Price, Quantity)>,
    pub asks: Vec<(Price, Quantity)>,
}

/// Live order book for a single pair
#[derive(Debug)]
pub struct OrderBook {
    pair_id: PairId,
    bids: BidBook,
    asks: AskBook,
    /// Where each resting order sits
    resting: HashMap<OrderId, (Side, Price)>,
    executor: MatchExecutor,
    log: ExecutionLog,
}

impl OrderBook {
    pub fn new(pair_id: PairId) -> Self {
        Self::with_log_capacity(pair_id, DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(pair_id: PairId, log_capacity: usize) -> Self {
        Self {
            pair_id,
            bids: BidBook::new(),
            asks: AskBook::new(),
            resting: HashMap::new(),
            executor: MatchExecutor::new(1),
            log: ExecutionLog::new(log_capacity),
        }
    }

    pub fn pair_id(&self) -> PairId {
        self.pair_id
    }

    /// Match an incoming order against the opposite side
    ///
    /// Trades execute at the resting (maker) price, best price first and
    /// oldest first within a price. Whatever is left of the order rests on
    /// its own side behind existing orders at the same price. An order that
    /// was already executed returns its original trades unchanged, as long
    /// as it is still inside the execution log window.
    pub fn execute(&mut self, order: Order) -> Result<Vec<Trade>, EngineError> {
        if let Some(trades) = self.log.get(order.id) {
            warn!(order_id = %order.id, trades = trades.len(), "order already executed, replaying trades");
            return Ok(trades.to_vec());
        }
        self.validate(&order)?;

        let timestamp = unix_nanos_now();
        let mut taker = order;
        let trades = match taker.side {
            Side::BUY => self.match_buy(&mut taker, timestamp)?,
            Side::SELL => self.match_sell(&mut taker, timestamp)?,
        };

        debug!(
            order_id = %taker.id,
            pair_id = %self.pair_id,
            side = ?taker.side,
            trades = trades.len(),
            remaining = %taker.remaining_quantity(),
            "order executed"
        );

        if !taker.is_filled() {
            self.rest(taker.clone());
        }
        self.log.record(taker.id, trades.clone());
        Ok(trades)
    }

    fn validate(&self, order: &Order) -> Result<(), EngineError> {
        if order.pair_id != self.pair_id {
            return Err(EngineError::WrongPair {
                order_id: order.id,
                expected: self.pair_id,
                got: order.pair_id,
            });
        }
        if order.status.is_terminal() {
            return Err(EngineError::TerminalOrder {
                order_id: order.id,
                status: order.status,
            });
        }
        if !order.remaining_quantity().is_positive() {
            return Err(EngineError::NothingRemaining(order.id));
        }
        if self.resting.contains_key(&order.id) {
            return Err(EngineError::DuplicateOrder(order.id));
        }
        Ok(())
    }

    /// Match incoming buy order against asks, lowest first
    fn match_buy(&mut self, taker: &mut Order, timestamp: i64) -> Result<Vec<Trade>, EngineError> {
        let limit = crossing::price_limit(taker);
        let mut trades = Vec::new();

        while let Some((ask_price, level)) = self.asks.best_ask_level_mut() {
            if !crossing::incoming_can_match(Side::BUY, limit, ask_price) {
                break;
            }
            let filled_maker =
                Self::match_level(self.pair_id, &mut self.executor, taker, ask_price, level, timestamp, &mut trades)?;
            if let Some(maker) = filled_maker {
                self.resting.remove(&maker);
            }
            self.asks.prune_level(ask_price);

            if taker.is_filled() {
                break;
            }
        }

        Ok(trades)
    }

    /// Match incoming sell order against bids, highest first
    fn match_sell(&mut self, taker: &mut Order, timestamp: i64) -> Result<Vec<Trade>, EngineError> {
        let limit = crossing::price_limit(taker);
        let mut trades = Vec::new();

        while let Some((bid_price, level)) = self.bids.best_bid_level_mut() {
            if !crossing::incoming_can_match(Side::SELL, limit, bid_price) {
                break;
            }
            let filled_maker =
                Self::match_level(self.pair_id, &mut self.executor, taker, bid_price, level, timestamp, &mut trades)?;
            if let Some(maker) = filled_maker {
                self.resting.remove(&maker);
            }
            self.bids.prune_level(bid_price);

            if taker.is_filled() {
                break;
            }
        }

        Ok(trades)
    }

    /// Fill the taker against the front order of one level
    ///
    /// Returns the maker id when the maker is used up and has left the level.
    fn match_level(
        pair_id: PairId,
        executor: &mut MatchExecutor,
        taker: &mut Order,
        price: Price,
        level: &mut PriceLevel,
        timestamp: i64,
        trades: &mut Vec<Trade>,
    ) -> Result<Option<OrderId>, EngineError> {
        let Some(maker) = level.front() else {
            return Ok(None);
        };

        let match_qty = taker.remaining_quantity().min(maker.remaining_quantity());
        let trade = executor.execute_trade(pair_id, taker, maker, price, match_qty, timestamp);

        taker.apply_fill(match_qty)?;
        let removed = level.fill_front(match_qty)?;
        trades.push(trade);

        Ok(removed.map(|maker| maker.id))
    }

    fn rest(&mut self, order: Order) {
        self.resting.insert(order.id, (order.side, order.price));
        match order.side {
            Side::BUY => self.bids.insert(order),
            Side::SELL => self.asks.insert(order),
        }
    }

    /// Resting state of an order, as the book sees it
    pub fn resting_order(&self, order_id: OrderId) -> Option<&Order> {
        let (side, price) = self.resting.get(&order_id)?;
        match side {
            Side::BUY => self.bids.get(order_id, *price),
            Side::SELL => self.asks.get(order_id, *price),
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_bid_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_ask_price()
    }

    pub fn bids(&self) -> &BidBook {
        &self.bids
    }

    pub fn asks(&self) -> &AskBook {
        &self.asks
    }

    pub fn resting_count(&self) -> usize {
        self.resting.len()
    }

    pub fn depth(&self, depth: usize) -> DepthSnapshot {
        DepthSnapshot {
            pair_id: self.pair_id,
            bids: self.bids.depth_snapshot(depth),
            asks: self.asks.depth_snapshot(depth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use types::ids::UserId;
    use types::order::OrderType;

    const PAIR: PairId = PairId::new(1);

    fn order(id: u64, side: Side, qty: u64, price: u64) -> Order {
        typed_order(id, side, OrderType::Limit, qty, price)
    }

    fn typed_order(id: u64, side: Side, order_type: OrderType, qty: u64, price: u64) -> Order {
        Order::new(
            OrderId::new(id),
            UserId::new(100 + id),
            PAIR,
            side,
            order_type,
            Price::from_u64(price),
            Quantity::from_u64(qty),
            1708123456789000000,
        )
    }

    fn summary(trades: &[Trade]) -> Vec<(u64, u64, Quantity, Price)> {
        trades
            .iter()
            .map(|t| (t.taker_order_id.value(), t.maker_order_id.value(), t.quantity, t.price))
            .collect()
    }

    /// Bids strictly descending, asks strictly ascending, every resting
    /// order partially open, and the book never crossed
    fn assert_book_sorted(book: &OrderBook) {
        let bid_prices: Vec<Price> = book.bids().depth_snapshot(usize::MAX).iter().map(|l| l.0).collect();
        let ask_prices: Vec<Price> = book.asks().depth_snapshot(usize::MAX).iter().map(|l| l.0).collect();
        assert!(bid_prices.windows(2).all(|w| w[0] > w[1]));
        assert!(ask_prices.windows(2).all(|w| w[0] < w[1]));
        for resting in book.bids().orders().chain(book.asks().orders()) {
            assert!(resting.filled_quantity < resting.quantity);
        }
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            assert!(bid < ask, "book crossed: bid {bid} >= ask {ask}");
        }
    }

    #[test]
    fn test_partial_fill_of_resting_order() {
        let mut book = OrderBook::new(PAIR);
        assert!(book.execute(order(1, Side::SELL, 10, 100)).unwrap().is_empty());

        let trades = book.execute(order(2, Side::BUY, 4, 100)).unwrap();
        assert_eq!(summary(&trades), vec![(2, 1, Quantity::from_u64(4), Price::from_u64(100))]);

        let maker = book.resting_order(OrderId::new(1)).unwrap();
        assert_eq!(maker.quantity, Quantity::from_u64(10));
        assert_eq!(maker.filled_quantity, Quantity::from_u64(4));
        assert!(book.resting_order(OrderId::new(2)).is_none());
    }

    #[test]
    fn test_sweep_two_levels_at_maker_prices() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::SELL, 5, 99)).unwrap();
        book.execute(order(2, Side::SELL, 10, 100)).unwrap();

        let trades = book.execute(order(3, Side::BUY, 12, 101)).unwrap();
        assert_eq!(
            summary(&trades),
            vec![
                (3, 1, Quantity::from_u64(5), Price::from_u64(99)),
                (3, 2, Quantity::from_u64(7), Price::from_u64(100)),
            ]
        );
        assert!(book.resting_order(OrderId::new(1)).is_none());
        assert_eq!(book.resting_order(OrderId::new(2)).unwrap().filled_quantity, Quantity::from_u64(7));
        assert!(trades[0].sequence < trades[1].sequence);
    }

    #[test]
    fn test_no_liquidity_rests_order() {
        let mut book = OrderBook::new(PAIR);
        let trades = book.execute(order(4, Side::BUY, 3, 50)).unwrap();

        assert!(trades.is_empty());
        assert_eq!(book.best_bid(), Some(Price::from_u64(50)));
        assert!(book.resting_order(OrderId::new(4)).is_some());
    }

    #[test]
    fn test_fifo_within_price_level() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::BUY, 2, 100)).unwrap();
        book.execute(order(2, Side::BUY, 2, 100)).unwrap();
        book.execute(order(3, Side::BUY, 2, 101)).unwrap();

        let trades = book.execute(order(4, Side::SELL, 5, 100)).unwrap();
        let makers: Vec<u64> = trades.iter().map(|t| t.maker_order_id.value()).collect();
        assert_eq!(makers, vec![3, 1, 2]);
        assert_eq!(trades[2].quantity, Quantity::from_u64(1));
        assert_eq!(trades[0].price, Price::from_u64(101));
    }

    #[test]
    fn test_remainder_rests_behind_existing_orders() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::SELL, 1, 100)).unwrap();
        book.execute(order(2, Side::BUY, 3, 99)).unwrap();
        // Crosses order 1, remainder 2 rests at 100 on the bid side
        book.execute(order(3, Side::BUY, 3, 100)).unwrap();
        book.execute(order(4, Side::BUY, 1, 100)).unwrap();

        let ids: Vec<u64> = book.bids().orders().map(|o| o.id.value()).collect();
        assert_eq!(ids, vec![3, 4, 2]);
        assert_eq!(book.resting_order(OrderId::new(3)).unwrap().filled_quantity, Quantity::from_u64(1));
        assert_book_sorted(&book);
    }

    #[test]
    fn test_market_sell_is_unbounded() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::BUY, 2, 10)).unwrap();

        let trades = book.execute(typed_order(2, Side::SELL, OrderType::Market, 2, 500)).unwrap();
        assert_eq!(summary(&trades), vec![(2, 1, Quantity::from_u64(2), Price::from_u64(10))]);
    }

    #[test]
    fn test_market_buy_never_crosses_above_submitted_price() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::SELL, 1, 90)).unwrap();
        book.execute(order(2, Side::SELL, 5, 120)).unwrap();

        let trades = book.execute(typed_order(3, Side::BUY, OrderType::Market, 3, 100)).unwrap();
        assert_eq!(summary(&trades), vec![(3, 1, Quantity::from_u64(1), Price::from_u64(90))]);

        // Remainder rests at the submitted price
        let rested = book.resting_order(OrderId::new(3)).unwrap();
        assert_eq!(rested.price, Price::from_u64(100));
        assert_eq!(rested.remaining_quantity(), Quantity::from_u64(2));
    }

    #[test]
    fn test_redelivered_order_replays_trades() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::SELL, 10, 100)).unwrap();
        let first = book.execute(order(2, Side::BUY, 4, 100)).unwrap();

        let again = book.execute(order(2, Side::BUY, 4, 100)).unwrap();
        assert_eq!(again, first);
        assert_eq!(book.resting_order(OrderId::new(1)).unwrap().filled_quantity, Quantity::from_u64(4));

        // Resting order redelivered: replay is empty, no duplicate resting entry
        assert!(book.execute(order(1, Side::SELL, 10, 100)).unwrap().is_empty());
        assert_eq!(book.resting_count(), 1);
    }

    #[test]
    fn test_filled_taker_replay_leaves_new_liquidity_alone() {
        let mut book = OrderBook::with_log_capacity(PAIR, 8);
        book.execute(order(1, Side::SELL, 4, 100)).unwrap();
        let first = book.execute(order(2, Side::BUY, 4, 100)).unwrap();
        assert!(book.resting_order(OrderId::new(2)).is_none());

        // Fresh liquidity the redelivered taker could cross
        book.execute(order(3, Side::SELL, 4, 100)).unwrap();
        for id in 4..=8 {
            book.execute(order(id, Side::SELL, 1, 200 + id)).unwrap();
        }

        let again = book.execute(order(2, Side::BUY, 4, 100)).unwrap();
        assert_eq!(again, first);
        assert!(book.resting_order(OrderId::new(3)).unwrap().filled_quantity.is_zero());
        assert_eq!(book.best_ask(), Some(Price::from_u64(100)));
    }

    #[test]
    fn test_duplicate_resting_order_outside_log_window() {
        let mut book = OrderBook::with_log_capacity(PAIR, 1);
        book.execute(order(1, Side::SELL, 10, 100)).unwrap();
        book.execute(order(2, Side::SELL, 10, 101)).unwrap();

        let err = book.execute(order(1, Side::SELL, 10, 100)).unwrap_err();
        assert_eq!(err, EngineError::DuplicateOrder(OrderId::new(1)));
    }

    #[test]
    fn test_rejected_inputs() {
        let mut book = OrderBook::new(PAIR);

        let mut foreign = order(1, Side::BUY, 1, 100);
        foreign.pair_id = PairId::new(2);
        assert!(matches!(book.execute(foreign), Err(EngineError::WrongPair { .. })));

        let mut done = order(2, Side::BUY, 1, 100);
        done.apply_fill(Quantity::from_u64(1)).unwrap();
        assert!(matches!(book.execute(done), Err(EngineError::TerminalOrder { .. })));

        let empty = order(3, Side::BUY, 0, 100);
        let err = book.execute(empty).unwrap_err();
        assert_eq!(err, EngineError::NothingRemaining(OrderId::new(3)));
        assert_eq!(err.class(), ErrorClass::Validation);

        assert_eq!(book.resting_count(), 0);
    }

    #[test]
    fn test_depth_snapshot() {
        let mut book = OrderBook::new(PAIR);
        book.execute(order(1, Side::BUY, 1, 99)).unwrap();
        book.execute(order(2, Side::BUY, 2, 99)).unwrap();
        book.execute(order(3, Side::SELL, 4, 101)).unwrap();

        let depth = book.depth(5);
        assert_eq!(depth.bids, vec![(Price::from_u64(99), Quantity::from_u64(3))]);
        assert_eq!(depth.asks, vec![(Price::from_u64(101), Quantity::from_u64(4))]);
    }

    fn arb_order() -> impl Strategy<Value = (bool, u64, u64)> {
        (any::<bool>(), 1u64..20, 95u64..106)
    }

    proptest! {
        #[test]
        fn prop_book_sorted_and_quantity_conserved(orders in proptest::collection::vec(arb_order(), 1..60)) {
            let mut book = OrderBook::new(PAIR);
            let mut remaining: HashMap<OrderId, Quantity> = HashMap::new();

            for (i, (is_buy, qty, price)) in orders.into_iter().enumerate() {
                let side = if is_buy { Side::BUY } else { Side::SELL };
                let incoming = order(i as u64 + 1, side, qty, price);
                remaining.insert(incoming.id, incoming.quantity);

                let trades = book.execute(incoming.clone()).unwrap();
                let mut taker_filled = Quantity::zero();
                for trade in &trades {
                    let taker_left = remaining[&trade.taker_order_id];
                    let maker_left = remaining[&trade.maker_order_id];
                    prop_assert!(trade.quantity.is_positive());
                    prop_assert!(trade.quantity <= taker_left.min(maker_left));
                    remaining.insert(trade.taker_order_id, taker_left.checked_sub(trade.quantity).unwrap());
                    remaining.insert(trade.maker_order_id, maker_left.checked_sub(trade.quantity).unwrap());
                    taker_filled = taker_filled.checked_add(trade.quantity).unwrap();
                }

                // Book state agrees with the trade stream
                for (id, left) in &remaining {
                    match book.resting_order(*id) {
                        Some(resting) => {
                            prop_assert_eq!(resting.remaining_quantity(), *left);
                        }
                        None => {
                            prop_assert!(left.is_zero());
                        }
                    }
                }
                prop_assert!(taker_filled <= incoming.quantity);
                assert_book_sorted(&book);
            }
        }
    }
}
