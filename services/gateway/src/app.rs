//! Process wiring
//!
//! Builds one in-process exchange: the store, lock service and broker that
//! stand in for external systems, the intake pipeline behind the HTTP API,
//! and the three background workers (outbox relay, matching, settlement).

use axum::Router;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lock_service::InMemoryLockService;
use matching_engine::MatchingService;
use messaging::InMemoryBroker;
use order_intake::{OrderIntake, OutboxRelay};
use persistence::{MemoryStore, Store};
use settlement::{SettlementCoordinator, SettlementService};
use types::account::{User, UserStatus};
use types::ids::{AssetId, PairCode, PairId, UserId};
use types::pair::TradingPair;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::router::create_router;
use crate::state::AppState;

/// Longest wait for a consumer to empty its topic during shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEMO_BTC: AssetId = AssetId::new(1);
pub const DEMO_USDT: AssetId = AssetId::new(2);
pub const DEMO_ETH: AssetId = AssetId::new(3);
/// Active demo traders
pub const DEMO_USERS: [UserId; 2] = [UserId::new(1), UserId::new(2)];
/// Demo trader whose orders are always rejected
pub const DEMO_BLOCKED_USER: UserId = UserId::new(3);

pub struct Exchange {
    config: Config,
    store: MemoryStore,
    broker: Arc<InMemoryBroker>,
    locks: Arc<InMemoryLockService>,
    relay: Arc<OutboxRelay>,
    state: AppState,
}

impl Exchange {
    pub fn new(config: Config) -> Self {
        let store = MemoryStore::new();
        let broker = Arc::new(InMemoryBroker::new());
        let locks = Arc::new(InMemoryLockService::new(config.lock_ttl));
        let shared_store: Arc<dyn Store> = Arc::new(store.clone());

        let relay = Arc::new(OutboxRelay::new(config.outbox(), Arc::clone(&shared_store), broker.clone()));
        let intake = Arc::new(OrderIntake::new(
            config.intake(),
            Arc::clone(&shared_store),
            locks.clone(),
            Arc::clone(&relay),
        ));
        let state = AppState::new(
            intake,
            shared_store,
            JwtKeys::from_secret(config.jwt_secret.as_bytes()),
            config.login(),
        );

        Self {
            config,
            store,
            broker,
            locks,
            relay,
            state,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn broker(&self) -> &Arc<InMemoryBroker> {
        &self.broker
    }

    pub fn locks(&self) -> &Arc<InMemoryLockService> {
        &self.locks
    }

    pub fn intake(&self) -> &Arc<OrderIntake> {
        &self.state.intake
    }

    pub fn jwt(&self) -> &JwtKeys {
        &self.state.jwt
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Reference data and balances for local runs
    ///
    /// Pairs BTC/USDT and ETH/USDT; [`DEMO_USERS`] hold 10 BTC, 100 ETH and
    /// 1,000,000 USDT each.
    pub fn seed_demo(&self) {
        let pairs = [(1, "BTC/USDT", DEMO_BTC), (2, "ETH/USDT", DEMO_ETH)];
        for (id, code, primary_asset_id) in pairs {
            let Some(code) = PairCode::try_new(code) else {
                warn!(code, "skipping malformed demo pair code");
                continue;
            };
            self.store.insert_pair(TradingPair {
                id: PairId::new(id),
                code,
                primary_asset_id,
                secondary_asset_id: DEMO_USDT,
            });
        }

        for user_id in DEMO_USERS {
            self.store
                .insert_user(User::new(user_id, format!("trader{user_id}@example.com"), UserStatus::Active));
            self.store.set_balance(user_id, DEMO_BTC, Decimal::from(10));
            self.store.set_balance(user_id, DEMO_ETH, Decimal::from(100));
            self.store.set_balance(user_id, DEMO_USDT, Decimal::from(1_000_000));
        }
        self.store
            .insert_user(User::new(DEMO_BLOCKED_USER, "blocked@example.com", UserStatus::Blocked));

        info!(users = DEMO_USERS.len() + 1, pairs = 2, "demo data seeded");
    }

    /// Spawn the outbox relay, the matching service and the settlement service
    pub fn start(&self) -> Workers {
        let relay = {
            let cancel = CancellationToken::new();
            let relay = Arc::clone(&self.relay);
            let token = cancel.clone();
            Worker {
                name: "outbox relay",
                cancel,
                task: tokio::spawn(async move { relay.run(token).await }),
            }
        };

        let matching = {
            let cancel = CancellationToken::new();
            let service = MatchingService::new(self.config.matching(), self.broker.clone(), self.broker.clone());
            let token = cancel.clone();
            Worker {
                name: "matching",
                cancel,
                task: tokio::spawn(async move {
                    if let Err(err) = service.run(token).await {
                        error!(fatal = true, error = %err, "matching service failed");
                    }
                }),
            }
        };

        let settlement = {
            let cancel = CancellationToken::new();
            let coordinator = Arc::new(SettlementCoordinator::new(
                Arc::new(self.store.clone()),
                self.locks.clone(),
                self.config.lock_timeout,
            ));
            let service = SettlementService::new(self.config.settlement(), self.broker.clone(), coordinator);
            let token = cancel.clone();
            Worker {
                name: "settlement",
                cancel,
                task: tokio::spawn(async move {
                    if let Err(err) = service.run(token).await {
                        error!(fatal = true, error = %err, "settlement service failed");
                    }
                }),
            }
        };

        info!("exchange workers started");
        Workers {
            relay,
            matching,
            settlement,
            broker: Arc::clone(&self.broker),
            order_topic: self.config.order_topic.clone(),
            trade_topic: self.config.trade_topic.clone(),
        }
    }
}

struct Worker {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Worker {
    async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            error!(worker = self.name, error = %err, "worker task panicked");
        }
    }
}

/// Handles to the running background workers
pub struct Workers {
    relay: Worker,
    matching: Worker,
    settlement: Worker,
    broker: Arc<InMemoryBroker>,
    order_topic: String,
    trade_topic: String,
}

impl Workers {
    /// Stop upstream stages first so each consumer sees what was published
    /// before it stops
    ///
    /// The relay does its final flush; matching and then settlement keep
    /// consuming until their topic is empty (bounded by a drain timeout)
    /// before they are cancelled.
    pub async fn shutdown(self) {
        self.relay.stop().await;

        drain(&self.broker, &self.order_topic).await;
        self.matching.stop().await;

        drain(&self.broker, &self.trade_topic).await;
        self.settlement.stop().await;

        info!("exchange workers stopped");
    }
}

async fn drain(broker: &InMemoryBroker, topic: &str) {
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while broker.depth(topic) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if drained.is_err() {
        warn!(topic, pending = broker.depth(topic), "messages still pending at shutdown");
    }
}
