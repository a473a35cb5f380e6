//! Trade consumer
//!
//! Each delivery carries the trade batch of one taker order. Deliveries are
//! settled on their own tasks, bounded by `max_in_flight`, and every task is
//! tracked so shutdown waits for the settlements already under way.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use messaging::{codec, Delivery, Subscriber, TRADE_TOPIC};
use types::errors::{Classify, ErrorClass};
use types::trade::Trade;

use crate::coordinator::{SettleOutcome, SettlementCoordinator};
use crate::error::SettlementError;

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    pub trade_topic: String,
    /// Budget for acquiring one trade's lock set
    pub lock_timeout: Duration,
    /// Budget for settling one delivery; on expiry it is redelivered
    pub handler_timeout: Duration,
    /// Deliveries settled concurrently
    pub max_in_flight: usize,
    /// Pause before handing a retryable failure back to the channel
    pub retry_backoff: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            trade_topic: TRADE_TOPIC.to_string(),
            lock_timeout: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(10),
            max_in_flight: 64,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

pub struct SettlementService {
    config: SettlementConfig,
    subscriber: Arc<dyn Subscriber>,
    coordinator: Arc<SettlementCoordinator>,
}

/// Per-delivery tally
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BatchReport {
    settled: usize,
    duplicates: usize,
    failed: usize,
}

impl SettlementService {
    pub fn new(config: SettlementConfig, subscriber: Arc<dyn Subscriber>, coordinator: Arc<SettlementCoordinator>) -> Self {
        Self {
            config,
            subscriber,
            coordinator,
        }
    }

    /// Consume trades until `cancel` fires, then wait for in-flight settlements
    pub async fn run(self, cancel: CancellationToken) -> Result<(), SettlementError> {
        let mut subscription = self.subscriber.subscribe(&self.config.trade_topic)?;
        let tracker = TaskTracker::new();
        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));

        info!(topic = %self.config.trade_topic, "settlement service started");

        let result = loop {
            let permit = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let fetched = tokio::select! {
                () = cancel.cancelled() => break Ok(()),
                fetched = subscription.fetch() => fetched,
            };

            let delivery = match fetched {
                Ok(delivery) => delivery,
                Err(err) if err.is_retryable() => {
                    warn!(error = %err, "trade fetch failed, retrying");
                    tokio::select! {
                        () = cancel.cancelled() => break Ok(()),
                        () = tokio::time::sleep(self.config.retry_backoff) => {}
                    }
                    continue;
                }
                Err(err) => break Err(SettlementError::from(err)),
            };

            let coordinator = Arc::clone(&self.coordinator);
            let config = self.config.clone();
            tracker.spawn(async move {
                handle_delivery(&coordinator, &config, delivery).await;
                drop(permit);
            });
        };

        tracker.close();
        tracker.wait().await;

        info!("settlement service stopped");
        result
    }
}

async fn handle_delivery(coordinator: &SettlementCoordinator, config: &SettlementConfig, delivery: Delivery) {
    let message = delivery.message();
    let trades: Vec<Trade> = match codec::decode(&message.payload) {
        Ok(trades) => trades,
        Err(err) => {
            error!(key = %message.key, offset = message.offset, error = %err, "undecodable trade message, discarding");
            delivery.ack();
            return;
        }
    };
    let key = message.key.clone();
    let attempt = message.attempt;

    match settle_within(coordinator, config.handler_timeout, &trades).await {
        Ok(report) => {
            debug!(
                key = %key,
                settled = report.settled,
                duplicates = report.duplicates,
                failed = report.failed,
                "trade batch handled"
            );
            delivery.ack();
        }
        Err(err) => {
            warn!(key = %key, attempt, error = %err, "settlement failed, will retry");
            tokio::time::sleep(config.retry_backoff).await;
            delivery.nack();
        }
    }
}

/// Settle a batch within `limit`; expiry drops the in-flight settlement,
/// rolling back its transaction and releasing its locks
async fn settle_within(
    coordinator: &SettlementCoordinator,
    limit: Duration,
    trades: &[Trade],
) -> Result<BatchReport, SettlementError> {
    tokio::time::timeout(limit, settle_batch(coordinator, trades))
        .await
        .unwrap_or(Err(SettlementError::Timeout(limit)))
}

/// Settle trades in the order the engine produced them
///
/// Stops at the first retryable failure so the whole batch is redelivered;
/// trades already applied come back as duplicates. Permanent failures are
/// logged and skipped.
async fn settle_batch(coordinator: &SettlementCoordinator, trades: &[Trade]) -> Result<BatchReport, SettlementError> {
    let mut report = BatchReport::default();

    for trade in trades {
        match coordinator.settle(trade).await {
            Ok(SettleOutcome::Settled) => report.settled += 1,
            Ok(SettleOutcome::AlreadySettled) => report.duplicates += 1,
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                let fatal = err.class() == ErrorClass::Fatal;
                error!(
                    fatal,
                    taker = %trade.taker_order_id,
                    maker = %trade.maker_order_id,
                    error = %err,
                    "trade cannot be settled"
                );
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
