//! Order consumer
//!
//! Fetches accepted orders from the order channel and routes each one, by
//! message key (the pair code), to that pair's actor task. The actor owns the
//! pair's `OrderBook` outright, executes orders one at a time, publishes the
//! resulting trade batch and only then acknowledges the order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use messaging::{codec, ChannelError, Delivery, Publisher, Subscriber, ORDER_TOPIC, TRADE_TOPIC};
use types::errors::{Classify, ErrorClass};
use types::ids::OrderId;
use types::order::Order;
use types::trade::Trade;

use crate::engine::OrderBook;
use crate::execution_log::DEFAULT_LOG_CAPACITY;

/// Matching service configuration
#[derive(Debug, Clone)]
pub struct MatchingConfig {
    pub order_topic: String,
    pub trade_topic: String,
    /// Deliveries buffered per pair actor
    pub actor_queue_depth: usize,
    /// Executions remembered per book for redelivery replay
    pub execution_log_capacity: usize,
    /// First delay between trade publish attempts
    pub publish_backoff: Duration,
    pub max_publish_backoff: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            order_topic: ORDER_TOPIC.to_string(),
            trade_topic: TRADE_TOPIC.to_string(),
            actor_queue_depth: 1024,
            execution_log_capacity: DEFAULT_LOG_CAPACITY,
            publish_backoff: Duration::from_millis(50),
            max_publish_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Error, Debug)]
pub enum MatchingError {
    #[error("order channel failed: {0}")]
    Channel(#[from] ChannelError),
}

pub struct MatchingService {
    config: MatchingConfig,
    subscriber: Arc<dyn Subscriber>,
    publisher: Arc<dyn Publisher>,
}

impl MatchingService {
    pub fn new(config: MatchingConfig, subscriber: Arc<dyn Subscriber>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            subscriber,
            publisher,
        }
    }

    /// Consume orders until `cancel` fires, then drain every pair actor
    pub async fn run(self, cancel: CancellationToken) -> Result<(), MatchingError> {
        let mut subscription = self.subscriber.subscribe(&self.config.order_topic)?;
        let tracker = TaskTracker::new();
        let mut actors: HashMap<String, mpsc::Sender<Delivery>> = HashMap::new();

        info!(topic = %self.config.order_topic, "matching service started");

        let result = loop {
            let fetched = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                fetched = subscription.fetch() => fetched,
            };

            let delivery = match fetched {
                Ok(delivery) => delivery,
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "order fetch failed, retrying");
                    tokio::select! {
                        () = cancel.cancelled() => break Ok(()),
                        () = tokio::time::sleep(self.config.publish_backoff) => {}
                    }
                    continue;
                }
                Err(err) => break Err(MatchingError::from(err)),
            };

            let pair_code = delivery.message().key.clone();
            let sender = actors
                .entry(pair_code.clone())
                .or_insert_with(|| self.spawn_actor(&tracker, &pair_code, cancel.clone()));

            if sender.send(delivery).await.is_err() {
                // The returned delivery is dropped here and redelivered
                error!(pair = %pair_code, "pair actor stopped unexpectedly");
                actors.remove(&pair_code);
            }
        };

        // Closing the queues lets each actor finish what it already holds
        drop(actors);
        tracker.close();
        tracker.wait().await;

        info!("matching service stopped");
        result
    }

    fn spawn_actor(&self, tracker: &TaskTracker, pair_code: &str, cancel: CancellationToken) -> mpsc::Sender<Delivery> {
        let (tx, rx) = mpsc::channel(self.config.actor_queue_depth);
        let actor = PairActor {
            pair_code: pair_code.to_string(),
            book: None,
            publisher: Arc::clone(&self.publisher),
            config: self.config.clone(),
            cancel,
        };
        debug!(pair = pair_code, "spawning pair actor");
        tracker.spawn(actor.run(rx));
        tx
    }
}

/// Single owner of one pair's book
struct PairActor {
    pair_code: String,
    /// Created from the first order seen for the pair
    book: Option<OrderBook>,
    publisher: Arc<dyn Publisher>,
    config: MatchingConfig,
    cancel: CancellationToken,
}

impl PairActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = rx.recv().await {
            self.handle(delivery).await;
        }
        debug!(pair = %self.pair_code, "pair actor drained");
    }

    async fn handle(&mut self, delivery: Delivery) {
        let order: Order = match codec::decode(&delivery.message().payload) {
            Ok(order) => order,
            Err(err) => {
                error!(
                    pair = %self.pair_code,
                    offset = delivery.message().offset,
                    error = %err,
                    "undecodable order message, discarding"
                );
                delivery.ack();
                return;
            }
        };

        let order_id = order.id;
        let log_capacity = self.config.execution_log_capacity;
        let book = self
            .book
            .get_or_insert_with(|| OrderBook::with_log_capacity(order.pair_id, log_capacity));

        let trades = match book.execute(order) {
            Ok(trades) => trades,
            Err(err) => {
                match err.class() {
                    ErrorClass::Fatal => error!(fatal = true, pair = %self.pair_code, order_id = %order_id, error = %err, "order execution failed"),
                    _ => warn!(pair = %self.pair_code, order_id = %order_id, error = %err, "order rejected by book"),
                }
                delivery.ack();
                return;
            }
        };

        if !trades.is_empty() && !self.publish_trades(order_id, &trades).await {
            // Left unacknowledged: on redelivery the execution log replays these trades
            error!(
                fatal = true,
                pair = %self.pair_code,
                order_id = %order_id,
                trades = trades.len(),
                "trade publication abandoned at shutdown"
            );
            delivery.nack();
            return;
        }

        delivery.ack();
    }

    /// Publish the batch, retrying with backoff until it lands or shutdown
    async fn publish_trades(&self, taker_order_id: OrderId, trades: &[Trade]) -> bool {
        let payload = match codec::encode(trades) {
            Ok(payload) => payload,
            Err(err) => {
                error!(fatal = true, order_id = %taker_order_id, error = %err, "failed to encode trade batch");
                return false;
            }
        };
        let key = taker_order_id.to_string();
        let mut backoff = self.config.publish_backoff;
        let mut attempt = 1u32;

        loop {
            match self.publisher.publish(&self.config.trade_topic, &key, payload.clone()).await {
                Ok(offset) => {
                    debug!(order_id = %taker_order_id, trades = trades.len(), offset, "trades published");
                    return true;
                }
                Err(err) => {
                    warn!(order_id = %taker_order_id, attempt, error = %err, "trade publish failed, retrying");
                }
            }

            tokio::select! {
                () = self.cancel.cancelled() => return false,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.max_publish_backoff);
            attempt += 1;
        }
    }
}
