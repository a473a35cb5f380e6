//! Trade settlement
//!
//! A settlement loads both orders under lock, advances their fill state,
//! credits each side with the asset it bought and records the trade, all in
//! one store transaction. The trade key makes the whole step idempotent:
//! a redelivered trade finds its key recorded and changes nothing.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use lock_service::{LockService, LockSet};
use persistence::{Store, StoreError};
use types::ids::{OrderId, UserId};
use types::order::{Order, Side};
use types::pair::TradingPair;
use types::trade::Trade;

use crate::error::SettlementError;
use crate::locks::settlement_lock_keys;

/// Result of a successful settle call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This call applied the trade
    Settled,
    /// The trade key was already recorded; nothing changed
    AlreadySettled,
}

pub struct SettlementCoordinator {
    store: Arc<dyn Store>,
    locks: Arc<dyn LockService>,
    lock_timeout: Duration,
}

impl SettlementCoordinator {
    pub fn new(store: Arc<dyn Store>, locks: Arc<dyn LockService>, lock_timeout: Duration) -> Self {
        Self {
            store,
            locks,
            lock_timeout,
        }
    }

    /// Apply one trade exactly once
    pub async fn settle(&self, trade: &Trade) -> Result<SettleOutcome, SettlementError> {
        let notional = validate(trade)?;
        let pair = self
            .store
            .pair_by_id(trade.pair_id)
            .await?
            .ok_or(SettlementError::UnknownPair(trade.pair_id))?;

        let locks = LockSet::acquire(
            Arc::clone(&self.locks),
            settlement_lock_keys(trade, &pair),
            self.lock_timeout,
        )
        .await?;

        let result = self.apply(trade, &pair, notional).await;

        // A failed release is already logged as fatal by the lock set; the
        // committed settlement stands.
        let _ = locks.release().await;
        result
    }

    async fn apply(
        &self,
        trade: &Trade,
        pair: &TradingPair,
        notional: Decimal,
    ) -> Result<SettleOutcome, SettlementError> {
        let key = trade.key();
        if self.store.trade_recorded(key).await? {
            debug!(taker = %key.taker_order_id, maker = %key.maker_order_id, "trade already settled");
            return Ok(SettleOutcome::AlreadySettled);
        }

        let mut taker = self.load_order(trade.taker_order_id, trade.taker_user_id).await?;
        let mut maker = self.load_order(trade.maker_order_id, trade.maker_user_id).await?;
        if taker.side != trade.side || maker.side != trade.side.opposite() {
            return Err(SettlementError::OrderMismatch {
                order_id: taker.id,
                detail: "order sides do not match trade side",
            });
        }

        taker.apply_fill(trade.quantity)?;
        maker.apply_fill(trade.quantity)?;

        let quantity = trade.quantity.as_decimal();
        let refund = price_improvement(&taker, trade)?;

        let mut tx = self.store.begin().await?;
        match trade.side {
            Side::BUY => {
                tx.adjust_balance(trade.taker_user_id, pair.primary_asset_id, quantity).await?;
                tx.adjust_balance(trade.maker_user_id, pair.secondary_asset_id, notional).await?;
                if refund > Decimal::ZERO {
                    tx.adjust_balance(trade.taker_user_id, pair.secondary_asset_id, refund).await?;
                }
            }
            Side::SELL => {
                tx.adjust_balance(trade.taker_user_id, pair.secondary_asset_id, notional).await?;
                tx.adjust_balance(trade.maker_user_id, pair.primary_asset_id, quantity).await?;
            }
        }
        tx.save_order(&taker).await?;
        tx.save_order(&maker).await?;
        tx.record_trade(trade).await?;

        match tx.commit().await {
            Ok(()) => {
                info!(
                    pair = %pair.code,
                    taker = %taker.id,
                    maker = %maker.id,
                    price = %trade.price,
                    quantity = %trade.quantity,
                    taker_status = ?taker.status,
                    maker_status = ?maker.status,
                    "trade settled"
                );
                Ok(SettleOutcome::Settled)
            }
            Err(StoreError::DuplicateTrade(_)) => {
                warn!(taker = %key.taker_order_id, maker = %key.maker_order_id, "trade recorded concurrently");
                Ok(SettleOutcome::AlreadySettled)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn load_order(&self, order_id: OrderId, user_id: UserId) -> Result<Order, SettlementError> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;
        if order.user_id != user_id {
            return Err(SettlementError::OrderMismatch {
                order_id,
                detail: "order belongs to another user",
            });
        }
        Ok(order)
    }
}

/// Returns the trade value in the secondary asset
fn validate(trade: &Trade) -> Result<Decimal, SettlementError> {
    if !trade.quantity.is_positive() {
        return Err(SettlementError::Validation(format!("quantity {} must be positive", trade.quantity)));
    }
    if trade.taker_order_id == trade.maker_order_id {
        return Err(SettlementError::Validation(format!(
            "order {} cannot trade with itself",
            trade.taker_order_id
        )));
    }
    trade.trade_value().ok_or_else(|| {
        SettlementError::Validation(format!("value of {} x {} is out of range", trade.quantity, trade.price))
    })
}

/// Secondary asset reserved by a BUY taker above what the trade cost
fn price_improvement(taker: &Order, trade: &Trade) -> Result<Decimal, SettlementError> {
    if trade.side != Side::BUY || taker.price <= trade.price {
        return Ok(Decimal::ZERO);
    }
    (taker.price.as_decimal() - trade.price.as_decimal())
        .checked_mul(trade.quantity.as_decimal())
        .ok_or_else(|| SettlementError::Validation(format!("refund for order {} is out of range", taker.id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lock_service::{InMemoryLockService, LockError};
    use persistence::{Ledger, MemoryStore, OrderStore};
    use types::account::{User, UserStatus};
    use types::errors::{Classify, ErrorClass, OrderError};
    use types::ids::{AssetId, PairCode, PairId, TradeId};
    use types::numeric::{Price, Quantity};
    use types::order::{reservation_amount, OrderStatus, OrderType};

    const BTC: AssetId = AssetId::new(1);
    const USDT: AssetId = AssetId::new(2);
    const ALICE: UserId = UserId::new(1);
    const BOB: UserId = UserId::new(2);

    struct Harness {
        store: MemoryStore,
        locks: Arc<InMemoryLockService>,
        coordinator: Arc<SettlementCoordinator>,
    }

    impl Harness {
        fn new() -> Self {
            let store = MemoryStore::new();
            store.insert_pair(TradingPair {
                id: PairId::new(1),
                code: PairCode::try_new("BTC/USDT").unwrap(),
                primary_asset_id: BTC,
                secondary_asset_id: USDT,
            });
            for (id, email) in [(ALICE, "alice@example.com"), (BOB, "bob@example.com")] {
                store.insert_user(User::new(id, email, UserStatus::Active));
                store.set_balance(id, BTC, Decimal::from(100));
                store.set_balance(id, USDT, Decimal::from(100000));
            }
            let locks = Arc::new(InMemoryLockService::default());
            let coordinator = Arc::new(SettlementCoordinator::new(
                Arc::new(store.clone()),
                locks.clone(),
                Duration::from_millis(500),
            ));
            Self { store, locks, coordinator }
        }

        /// Persist an order the way intake does: reserve, then save
        async fn place(&self, user: UserId, side: Side, qty: u64, price: u64) -> Order {
            let mut tx = self.store.begin().await.unwrap();
            let id = tx.allocate_order_id().await.unwrap();
            let order = Order::new(
                id,
                user,
                PairId::new(1),
                side,
                OrderType::Limit,
                Price::from_u64(price),
                Quantity::from_u64(qty),
                0,
            );
            let funding = if side == Side::BUY { USDT } else { BTC };
            let amount = reservation_amount(side, order.price, order.quantity).unwrap();
            tx.adjust_balance(user, funding, -amount).await.unwrap();
            tx.save_order(&order).await.unwrap();
            tx.commit().await.unwrap();
            order
        }

        async fn balance(&self, user: UserId, asset: AssetId) -> Decimal {
            self.store.balance(user, asset).await.unwrap()
        }

        async fn order(&self, id: OrderId) -> Order {
            self.store.order(id).await.unwrap().unwrap()
        }
    }

    fn trade(taker: &Order, maker: &Order, qty: u64, price: u64) -> Trade {
        Trade {
            trade_id: TradeId::new(),
            sequence: 1,
            pair_id: taker.pair_id,
            taker_order_id: taker.id,
            maker_order_id: maker.id,
            taker_user_id: taker.user_id,
            maker_user_id: maker.user_id,
            side: taker.side,
            price: Price::from_u64(price),
            quantity: Quantity::from_u64(qty),
            trade_time: 0,
        }
    }

    #[tokio::test]
    async fn test_buy_taker_settlement() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 10, 100).await;
        let taker = h.place(ALICE, Side::BUY, 4, 100).await;

        let outcome = h.coordinator.settle(&trade(&taker, &maker, 4, 100)).await.unwrap();
        assert_eq!(outcome, SettleOutcome::Settled);

        // Alice paid 400 USDT at intake and receives 4 BTC
        assert_eq!(h.balance(ALICE, BTC).await, Decimal::from(104));
        assert_eq!(h.balance(ALICE, USDT).await, Decimal::from(99600));
        // Bob reserved 10 BTC at intake and receives 400 USDT
        assert_eq!(h.balance(BOB, BTC).await, Decimal::from(90));
        assert_eq!(h.balance(BOB, USDT).await, Decimal::from(100400));

        let taker = h.order(taker.id).await;
        let maker = h.order(maker.id).await;
        assert_eq!(taker.status, OrderStatus::Complete);
        assert_eq!(maker.status, OrderStatus::Partial);
        assert_eq!(maker.filled_quantity, Quantity::from_u64(4));
        assert_eq!(h.store.trades().len(), 1);
        assert_eq!(h.locks.held_count(), 0);
    }

    #[tokio::test]
    async fn test_sell_taker_settlement() {
        let h = Harness::new();
        let maker = h.place(ALICE, Side::BUY, 5, 100).await;
        let taker = h.place(BOB, Side::SELL, 5, 95).await;

        h.coordinator.settle(&trade(&taker, &maker, 5, 100)).await.unwrap();

        assert_eq!(h.balance(BOB, USDT).await, Decimal::from(100500));
        assert_eq!(h.balance(BOB, BTC).await, Decimal::from(95));
        assert_eq!(h.balance(ALICE, BTC).await, Decimal::from(105));
        assert_eq!(h.balance(ALICE, USDT).await, Decimal::from(99500));
    }

    #[tokio::test]
    async fn test_buy_taker_gets_price_improvement_refund() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 5, 99).await;
        let taker = h.place(ALICE, Side::BUY, 5, 101).await;
        assert_eq!(h.balance(ALICE, USDT).await, Decimal::from(99495));

        h.coordinator.settle(&trade(&taker, &maker, 5, 99)).await.unwrap();

        // Reserved 505, paid 495, refunded 10
        assert_eq!(h.balance(ALICE, USDT).await, Decimal::from(99505));
        assert_eq!(h.balance(BOB, USDT).await, Decimal::from(100495));
    }

    #[tokio::test]
    async fn test_redelivered_trade_changes_nothing() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 10, 100).await;
        let taker = h.place(ALICE, Side::BUY, 4, 100).await;
        let first = trade(&taker, &maker, 4, 100);

        assert_eq!(h.coordinator.settle(&first).await.unwrap(), SettleOutcome::Settled);
        let wallets = h.store.wallets();

        // Replayed by the engine with a fresh trade id; same key
        let replay = Trade { trade_id: TradeId::new(), ..first.clone() };
        assert_eq!(h.coordinator.settle(&replay).await.unwrap(), SettleOutcome::AlreadySettled);
        assert_eq!(h.coordinator.settle(&first).await.unwrap(), SettleOutcome::AlreadySettled);

        assert_eq!(h.store.wallets(), wallets);
        assert_eq!(h.order(maker.id).await.filled_quantity, Quantity::from_u64(4));
        assert_eq!(h.store.trades().len(), 1);
    }

    #[tokio::test]
    async fn test_fill_on_complete_order_is_fatal() {
        let h = Harness::new();
        let first_maker = h.place(BOB, Side::SELL, 4, 100).await;
        let second_maker = h.place(BOB, Side::SELL, 4, 100).await;
        let taker = h.place(ALICE, Side::BUY, 4, 100).await;

        h.coordinator.settle(&trade(&taker, &first_maker, 4, 100)).await.unwrap();
        let wallets = h.store.wallets();

        let err = h.coordinator.settle(&trade(&taker, &second_maker, 4, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::Order(OrderError::AlreadyTerminal { .. })));
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert_eq!(h.store.wallets(), wallets);
        assert_eq!(h.order(second_maker.id).await.status, OrderStatus::Progress);
        assert_eq!(h.locks.held_count(), 0);
    }

    #[tokio::test]
    async fn test_overfill_is_rejected_atomically() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 3, 100).await;
        let taker = h.place(ALICE, Side::BUY, 5, 100).await;
        let wallets = h.store.wallets();

        let err = h.coordinator.settle(&trade(&taker, &maker, 5, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::Order(OrderError::Overfill { .. })));
        assert_eq!(h.store.wallets(), wallets);
        assert_eq!(h.order(taker.id).await.filled_quantity, Quantity::zero());
    }

    #[tokio::test]
    async fn test_rejects_malformed_trades() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 3, 100).await;
        let taker = h.place(ALICE, Side::BUY, 3, 100).await;

        let self_trade = trade(&taker, &taker, 1, 100);
        let err = h.coordinator.settle(&self_trade).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        let mut zero = trade(&taker, &maker, 1, 100);
        zero.quantity = Quantity::zero();
        assert!(matches!(h.coordinator.settle(&zero).await, Err(SettlementError::Validation(_))));

        let mut unknown_pair = trade(&taker, &maker, 1, 100);
        unknown_pair.pair_id = PairId::new(42);
        assert!(matches!(
            h.coordinator.settle(&unknown_pair).await,
            Err(SettlementError::UnknownPair(_))
        ));

        let mut wrong_user = trade(&taker, &maker, 1, 100);
        wrong_user.maker_user_id = ALICE;
        let err = h.coordinator.settle(&wrong_user).await.unwrap_err();
        assert!(matches!(err, SettlementError::OrderMismatch { .. }));
        assert_eq!(err.class(), ErrorClass::Fatal);

        let mut missing = trade(&taker, &maker, 1, 100);
        missing.maker_order_id = OrderId::new(999);
        assert!(matches!(
            h.coordinator.settle(&missing).await,
            Err(SettlementError::OrderNotFound(_))
        ));

        let mut out_of_range = trade(&taker, &maker, 2, 100);
        out_of_range.price = Price::try_new(Decimal::MAX).unwrap();
        let err = h.coordinator.settle(&out_of_range).await.unwrap_err();
        assert!(matches!(err, SettlementError::Validation(_)));
        assert!(!err.is_retryable());

        assert!(h.store.trades().is_empty());
        assert_eq!(h.locks.held_count(), 0);
        assert_eq!(h.balance(BOB, USDT).await, Decimal::from(100000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_held_order_lock_is_transient() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 3, 100).await;
        let taker = h.place(ALICE, Side::BUY, 3, 100).await;
        let blocker = h
            .locks
            .acquire(&lock_service::LockKey::Order(maker.id).name(), Duration::from_millis(1))
            .await
            .unwrap();

        let err = h.coordinator.settle(&trade(&taker, &maker, 3, 100)).await.unwrap_err();
        assert!(matches!(err, SettlementError::Lock(LockError::Timeout { .. })));
        assert!(err.is_retryable());

        h.locks.release(&blocker).await.unwrap();
        assert_eq!(
            h.coordinator.settle(&trade(&taker, &maker, 3, 100)).await.unwrap(),
            SettleOutcome::Settled
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_transient() {
        let h = Harness::new();
        let maker = h.place(BOB, Side::SELL, 3, 100).await;
        let taker = h.place(ALICE, Side::BUY, 3, 100).await;
        h.store.set_unavailable(true);

        let err = h.coordinator.settle(&trade(&taker, &maker, 3, 100)).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.locks.held_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_crossing_settlements_do_not_deadlock() {
        let h = Harness::new();
        // Each order is a maker in one trade and a taker in another, with
        // both users on both sides, so naive per-role locking would cycle.
        let a_sell = h.place(ALICE, Side::SELL, 10, 100).await;
        let b_buy = h.place(BOB, Side::BUY, 10, 100).await;
        let b_sell = h.place(BOB, Side::SELL, 10, 100).await;
        let a_buy = h.place(ALICE, Side::BUY, 10, 100).await;

        let mut trades = Vec::new();
        for _ in 0..5 {
            trades.push(trade(&b_buy, &a_sell, 1, 100));
            trades.push(trade(&a_sell, &b_buy, 1, 100));
            trades.push(trade(&a_buy, &b_sell, 1, 100));
            trades.push(trade(&b_sell, &a_buy, 1, 100));
        }

        let mut handles = Vec::new();
        for t in trades {
            let coordinator = Arc::clone(&h.coordinator);
            handles.push(tokio::spawn(async move { coordinator.settle(&t).await }));
        }

        let settled = tokio::time::timeout(Duration::from_secs(10), async {
            let mut outcomes = Vec::new();
            for handle in handles {
                outcomes.push(handle.await.unwrap());
            }
            outcomes
        })
        .await
        .expect("settlements deadlocked");

        // Each of the four keys settles once; the other copies see it recorded
        let applied = settled.iter().filter(|r| matches!(r, Ok(SettleOutcome::Settled))).count();
        assert_eq!(applied, 4);
        assert_eq!(h.store.trades().len(), 4);
        assert_eq!(h.locks.held_count(), 0);
        for order in h.store.orders() {
            assert!(order.check_invariant());
        }
    }
}
