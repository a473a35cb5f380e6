//! Reservation protocol
//!
//! 1. Validate the request and resolve pair and user
//! 2. Lock `Wallet(user, funding asset)` with a bounded wait
//! 3. Check the balance covers the reservation
//! 4. In one transaction: debit, persist the order, enqueue the outbox entry
//! 5. Release the lock, then flush the outbox relay
//!
//! A rejection at any step before the commit leaves nothing behind.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use lock_service::{LockKey, LockService, LockSet};
use messaging::{codec, ORDER_TOPIC};
use persistence::Store;
use types::ids::{AssetId, UserId};
use types::order::{Order, OrderRequest};
use types::pair::TradingPair;
use types::time::unix_nanos_now;

use crate::error::IntakeError;
use crate::outbox::OutboxRelay;

/// Intake configuration
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub order_topic: String,
    /// Longest wait for the funding wallet lock
    pub lock_timeout: Duration,
    /// Budget for validation, locking and the commit
    pub request_timeout: Duration,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            order_topic: ORDER_TOPIC.to_string(),
            lock_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct OrderIntake {
    config: IntakeConfig,
    store: Arc<dyn Store>,
    locks: Arc<dyn LockService>,
    relay: Arc<OutboxRelay>,
}

impl OrderIntake {
    pub fn new(
        config: IntakeConfig,
        store: Arc<dyn Store>,
        locks: Arc<dyn LockService>,
        relay: Arc<OutboxRelay>,
    ) -> Self {
        Self {
            config,
            store,
            locks,
            relay,
        }
    }

    /// Reserve funds for and persist a new order, then hand it to matching
    ///
    /// On `PublishFailed` the order and its reservation are committed; the
    /// background relay publishes it later.
    pub async fn submit(&self, user_id: UserId, request: OrderRequest) -> Result<Order, IntakeError> {
        let order = tokio::time::timeout(self.config.request_timeout, self.reserve(user_id, request))
            .await
            .map_err(|_| IntakeError::Timeout(self.config.request_timeout))??;

        if let Err(err) = self.relay.flush().await {
            error!(fatal = true, order_id = %order.id, error = %err, "order accepted but publication failed");
            return Err(IntakeError::PublishFailed { order_id: order.id });
        }

        Ok(order)
    }

    async fn reserve(&self, user_id: UserId, request: OrderRequest) -> Result<Order, IntakeError> {
        if !request.quantity.is_positive() {
            return Err(IntakeError::Validation(format!(
                "quantity must be positive, got {}",
                request.quantity
            )));
        }
        // Every order on the book has a representable value, so trades built
        // from it do too
        if request.price.notional(request.quantity).is_none() {
            return Err(IntakeError::Validation(format!(
                "order value {} x {} is out of range",
                request.quantity, request.price
            )));
        }
        let Some(required) = request.reservation_amount() else {
            return Err(IntakeError::Validation("reservation amount is out of range".to_string()));
        };

        let pair = self
            .store
            .pair_by_code(&request.pair_code)
            .await?
            .ok_or_else(|| IntakeError::UnknownPair(request.pair_code.clone()))?;
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or(IntakeError::UnknownUser(user_id))?;
        if !user.is_active() {
            return Err(IntakeError::UserBlocked(user_id));
        }

        let funding_asset = pair.funding_asset(request.side);

        let locks = LockSet::acquire(
            Arc::clone(&self.locks),
            [LockKey::wallet(user_id, funding_asset)],
            self.config.lock_timeout,
        )
        .await
        .map_err(IntakeError::LockUnavailable)?;

        let result = self.debit_and_persist(&pair, user_id, funding_asset, required, &request).await;

        // Release failures are logged by the lock set; the outcome stands
        let _ = locks.release().await;
        result
    }

    async fn debit_and_persist(
        &self,
        pair: &TradingPair,
        user_id: UserId,
        funding_asset: AssetId,
        required: Decimal,
        request: &OrderRequest,
    ) -> Result<Order, IntakeError> {
        let available = self.store.balance(user_id, funding_asset).await?;
        if available < required {
            debug!(user_id = %user_id, asset_id = %funding_asset, %required, %available, "insufficient balance");
            return Err(IntakeError::InsufficientBalance { required, available });
        }

        let mut tx = self.store.begin().await?;
        tx.adjust_balance(user_id, funding_asset, -required).await?;

        let order_id = tx.allocate_order_id().await?;
        let order = Order::new(
            order_id,
            user_id,
            pair.id,
            request.side,
            request.order_type,
            request.price,
            request.quantity,
            unix_nanos_now(),
        );
        tx.save_order(&order).await?;

        let payload = codec::encode(&order).map_err(IntakeError::Codec)?;
        tx.enqueue_outbox(&self.config.order_topic, pair.code.as_str(), payload)
            .await?;
        tx.commit().await?;

        info!(
            order_id = %order.id,
            user_id = %user_id,
            pair = %pair.code.as_str(),
            side = ?order.side,
            order_type = ?order.order_type,
            reserved = %required,
            "order accepted"
        );
        Ok(order)
    }
}
