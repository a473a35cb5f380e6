//! Message channel
//!
//! At-least-once, keyed delivery between Order Intake, the Matching Engine
//! and Settlement. Messages with the same key are delivered in publish order
//! and one at a time: the next message for a key is held back until the
//! in-flight one is acknowledged. A delivery that is nacked, or dropped
//! without a verdict, is redelivered before anything behind it.

pub mod codec;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use std::sync::Arc;

pub use error::ChannelError;
pub use memory::InMemoryBroker;

/// Default topic carrying accepted orders, keyed by pair code
pub const ORDER_TOPIC: &str = "orders";
/// Default topic carrying trade batches, keyed by taker order id
pub const TRADE_TOPIC: &str = "trades";

/// A message as stored by the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    /// Position within the topic, assigned at publish
    pub offset: u64,
    /// 1 on first delivery, incremented on each redelivery
    pub attempt: u32,
}

/// Producer side of the channel
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Append a message; returns its offset
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<u64, ChannelError>;
}

/// Consumer side of one topic
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next deliverable message
    async fn fetch(&mut self) -> Result<Delivery, ChannelError>;
}

/// Source of subscriptions
pub trait Subscriber: Send + Sync {
    fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscription>, ChannelError>;
}

/// Receives the verdict for a delivery
pub trait Acknowledger: Send + Sync {
    fn ack(&self, message: &Message);
    fn nack(&self, message: &Message);
}

/// A fetched message awaiting a verdict
///
/// Dropping a delivery without calling [`Delivery::ack`] counts as a nack,
/// so a handler that is cancelled or panics leaves the message for
/// redelivery.
pub struct Delivery {
    message: Message,
    acker: Arc<dyn Acknowledger>,
    settled: bool,
}

impl Delivery {
    pub fn new(message: Message, acker: Arc<dyn Acknowledger>) -> Self {
        Self {
            message,
            acker,
            settled: false,
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Commit the message; it will not be delivered again
    pub fn ack(mut self) {
        self.settled = true;
        self.acker.ack(&self.message);
    }

    /// Reject the message for redelivery
    pub fn nack(mut self) {
        self.settled = true;
        self.acker.nack(&self.message);
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if !self.settled {
            self.acker.nack(&self.message);
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("settled", &self.settled)
            .finish()
    }
}
