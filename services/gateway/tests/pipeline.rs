//! Intake, matching and settlement running together over the in-memory broker

use rust_decimal::Decimal;
use std::time::Duration;

use gateway::app::{DEMO_BTC, DEMO_USDT, DEMO_USERS};
use gateway::{Config, Exchange};
use persistence::{Ledger, OrderStore};
use types::ids::{AssetId, PairCode, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderRequest, OrderStatus, OrderType, Side};

fn exchange() -> Exchange {
    let config = Config {
        outbox_interval: Duration::from_millis(20),
        ..Config::default()
    };
    let exchange = Exchange::new(config);
    exchange.seed_demo();
    exchange
}

fn request(side: Side, qty: u64, price: u64) -> OrderRequest {
    OrderRequest {
        pair_code: PairCode::try_new("BTC/USDT").unwrap(),
        quantity: Quantity::from_u64(qty),
        price: Price::from_u64(price),
        side,
        order_type: OrderType::Limit,
    }
}

async fn submit(exchange: &Exchange, user: UserId, side: Side, qty: u64, price: u64) -> Order {
    exchange.intake().submit(user, request(side, qty, price)).await.unwrap()
}

async fn balance(exchange: &Exchange, user: UserId, asset: AssetId) -> Decimal {
    exchange.store().balance(user, asset).await.unwrap()
}

async fn wait_for_trades(exchange: &Exchange, count: usize) {
    for _ in 0..500 {
        if exchange.store().trades().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} settled trades, found {}", exchange.store().trades().len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_buy_sweeps_two_levels_and_settles() {
    let exchange = exchange();
    let workers = exchange.start();
    let [buyer, seller] = DEMO_USERS;

    let cheap = submit(&exchange, seller, Side::SELL, 5, 99).await;
    let dear = submit(&exchange, seller, Side::SELL, 5, 100).await;
    let taker = submit(&exchange, buyer, Side::BUY, 8, 101).await;

    wait_for_trades(&exchange, 2).await;
    workers.shutdown().await;

    let store = exchange.store();
    assert_eq!(store.order(cheap.id).await.unwrap().unwrap().status, OrderStatus::Complete);
    let dear = store.order(dear.id).await.unwrap().unwrap();
    assert_eq!(dear.status, OrderStatus::Partial);
    assert_eq!(dear.filled_quantity, Quantity::from_u64(3));
    assert_eq!(store.order(taker.id).await.unwrap().unwrap().status, OrderStatus::Complete);

    // 5 @ 99 + 3 @ 100 = 795; the 808 reserved at 101 is refunded down to it
    assert_eq!(balance(&exchange, buyer, DEMO_BTC).await, Decimal::from(18));
    assert_eq!(balance(&exchange, buyer, DEMO_USDT).await, Decimal::from(1_000_000 - 795));
    assert_eq!(balance(&exchange, seller, DEMO_BTC).await, Decimal::ZERO);
    assert_eq!(balance(&exchange, seller, DEMO_USDT).await, Decimal::from(1_000_000 + 795));
    assert_eq!(exchange.locks().held_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_drains_published_work() {
    let exchange = exchange();
    let workers = exchange.start();
    let [buyer, seller] = DEMO_USERS;

    submit(&exchange, seller, Side::SELL, 2, 100).await;
    submit(&exchange, buyer, Side::BUY, 2, 100).await;
    workers.shutdown().await;

    assert_eq!(exchange.store().trades().len(), 1);
    assert_eq!(exchange.broker().depth("orders"), 0);
    assert_eq!(exchange.broker().depth("trades"), 0);
    assert_eq!(balance(&exchange, buyer, DEMO_BTC).await, Decimal::from(12));
}

/// Wallets plus what open orders still hold in reserve never change in total
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_assets_are_conserved_across_the_pipeline() {
    let exchange = exchange();
    let workers = exchange.start();
    let prices = [98u64, 101, 99, 100, 102, 97, 100];

    for i in 0..16usize {
        let user = DEMO_USERS[i % 2];
        let side = if (i / 2) % 2 == 0 { Side::BUY } else { Side::SELL };
        let qty = 1 + (i as u64 % 3);
        exchange
            .intake()
            .submit(user, request(side, qty, prices[i % prices.len()]))
            .await
            .unwrap();
    }
    workers.shutdown().await;

    let store = exchange.store();
    let mut btc = Decimal::ZERO;
    let mut usdt = Decimal::ZERO;
    for user in DEMO_USERS {
        btc += balance(&exchange, user, DEMO_BTC).await;
        usdt += balance(&exchange, user, DEMO_USDT).await;
    }
    for order in store.orders() {
        assert!(order.check_invariant());
        let remaining = order.remaining_quantity();
        match order.side {
            Side::SELL => btc += remaining.as_decimal(),
            Side::BUY => usdt += order.price.notional(remaining).unwrap(),
        }
    }

    assert!(!store.trades().is_empty());
    assert_eq!(btc, Decimal::from(20));
    assert_eq!(usdt, Decimal::from(2_000_000));
}
