//! Outbox relay
//!
//! Moves committed outbox entries onto the message channel. Entries go out in
//! commit order, one flush at a time; an entry is marked dispatched only after
//! the channel accepted it, so a failure leaves it (and everything behind it)
//! pending for the next flush.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use messaging::Publisher;
use persistence::Store;

use crate::error::RelayError;

/// Relay configuration
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Period of the background flush
    pub interval: Duration,
    /// Entries read from the store per round trip
    pub batch_size: usize,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            batch_size: 100,
        }
    }
}

pub struct OutboxRelay {
    config: OutboxConfig,
    store: Arc<dyn Store>,
    publisher: Arc<dyn Publisher>,
    /// Single-flight gate; concurrent flushes would reorder entries
    gate: Mutex<()>,
}

impl OutboxRelay {
    pub fn new(config: OutboxConfig, store: Arc<dyn Store>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            store,
            publisher,
            gate: Mutex::new(()),
        }
    }

    /// Publish every pending entry in sequence order
    ///
    /// Returns how many entries this call published. Stops at the first
    /// failure.
    pub async fn flush(&self) -> Result<usize, RelayError> {
        let _gate = self.gate.lock().await;
        let mut published = 0;

        loop {
            let batch = self.store.pending_outbox(self.config.batch_size.max(1)).await?;
            if batch.is_empty() {
                return Ok(published);
            }

            for entry in batch {
                if let Err(err) = self.publisher.publish(&entry.topic, &entry.key, entry.payload).await {
                    warn!(sequence = entry.sequence, topic = %entry.topic, error = %err, "outbox publish failed");
                    return Err(err.into());
                }
                self.store.mark_dispatched(entry.sequence).await?;
                debug!(sequence = entry.sequence, topic = %entry.topic, key = %entry.key, "outbox entry dispatched");
                published += 1;
            }
        }
    }

    /// Flush periodically until `cancel` fires, then flush once more
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.flush().await {
                        warn!(error = %err, "outbox flush failed, retrying next tick");
                    }
                }
            }
        }

        match self.flush().await {
            Ok(published) => info!(published, "outbox relay stopped"),
            Err(err) => error!(fatal = true, error = %err, "final outbox flush failed; entries remain pending"),
        }
    }
}
