//! Ordered multi-lock acquisition with scoped release

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::error;

use crate::{Lease, LockError, LockKey, LockService};

/// A group of leases acquired in [`LockKey`] order
///
/// Call [`LockSet::release`] on every path. If the set is dropped while
/// still holding leases (a cancelled future, an early return) the leases
/// are released on a background task instead.
pub struct LockSet {
    service: Arc<dyn LockService>,
    held: Vec<(LockKey, Lease)>,
}

impl LockSet {
    /// Acquire every key, sorted and de-duplicated, within one `timeout` budget
    ///
    /// On failure the leases already taken are released before returning.
    pub async fn acquire(
        service: Arc<dyn LockService>,
        keys: impl IntoIterator<Item = LockKey>,
        timeout: Duration,
    ) -> Result<Self, LockError> {
        let ordered: BTreeSet<LockKey> = keys.into_iter().collect();
        let deadline = Instant::now() + timeout;
        let mut set = LockSet {
            service,
            held: Vec::with_capacity(ordered.len()),
        };

        for key in ordered {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match set.service.acquire(&key.name(), remaining).await {
                Ok(lease) => set.held.push((key, lease)),
                Err(err) => {
                    // Release failures are logged inside release(); the acquire error wins
                    let _ = set.release().await;
                    return Err(err);
                }
            }
        }

        Ok(set)
    }

    /// Keys held, in acquisition order
    pub fn keys(&self) -> Vec<LockKey> {
        self.held.iter().map(|(key, _)| *key).collect()
    }

    /// Release every lease in reverse acquisition order
    ///
    /// Every lease is attempted even if an earlier release fails; the first
    /// error is returned. A failed release means exclusion was lost while we
    /// believed we held it, so it is logged as fatal.
    pub async fn release(mut self) -> Result<(), LockError> {
        let held = std::mem::take(&mut self.held);
        let mut first_error = None;

        for (key, lease) in held.iter().rev() {
            if let Err(err) = self.service.release(lease).await {
                error!(fatal = true, lock = %key, error = %err, "failed to release lock");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        let held = std::mem::take(&mut self.held);
        let service = Arc::clone(&self.service);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for (key, lease) in held.iter().rev() {
                        if let Err(err) = service.release(lease).await {
                            error!(fatal = true, lock = %key, error = %err, "failed to release dropped lock");
                        }
                    }
                });
            }
            Err(_) => {
                error!(
                    fatal = true,
                    leases = held.len(),
                    "lock set dropped outside a runtime; leases will expire by TTL"
                );
            }
        }
    }
}
