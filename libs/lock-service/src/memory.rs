//! In-process lock service
//!
//! Lease table in a `DashMap`; waiters park on a `Notify` that is signalled
//! on every release, and also wake when the current holder's TTL runs out.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Lease, LockError, LockService};

/// Default lease time-to-live
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
struct Held {
    token: Uuid,
    expires_at: Instant,
}

/// Lock service backed by process memory
#[derive(Debug)]
pub struct InMemoryLockService {
    leases: DashMap<String, Held>,
    released: Notify,
    ttl: Duration,
}

impl InMemoryLockService {
    pub fn new(ttl: Duration) -> Self {
        Self {
            leases: DashMap::new(),
            released: Notify::new(),
            ttl,
        }
    }

    /// Number of names currently leased (expired leases included)
    pub fn held_count(&self) -> usize {
        self.leases.len()
    }

    /// Whether `name` is currently leased and not expired
    pub fn is_held(&self, name: &str) -> bool {
        self.leases
            .get(name)
            .map(|held| held.expires_at > Instant::now())
            .unwrap_or(false)
    }

    fn try_acquire(&self, name: &str) -> Result<Lease, Instant> {
        let now = Instant::now();
        let fresh = Held {
            token: Uuid::new_v4(),
            expires_at: now + self.ttl,
        };

        match self.leases.entry(name.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(fresh);
            }
            Entry::Occupied(mut entry) => {
                if entry.get().expires_at > now {
                    return Err(entry.get().expires_at);
                }
                warn!(lock = name, "taking over expired lease");
                entry.insert(fresh);
            }
        }

        Ok(Lease::new(name, fresh.token, fresh.expires_at))
    }
}

impl Default for InMemoryLockService {
    fn default() -> Self {
        Self::new(DEFAULT_LEASE_TTL)
    }
}

#[async_trait]
impl LockService for InMemoryLockService {
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Lease, LockError> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            // Register interest before checking so a release in between is not missed
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let holder_expiry = match self.try_acquire(name) {
                Ok(lease) => {
                    debug!(lock = name, waited_us = started.elapsed().as_micros() as u64, "lock acquired");
                    return Ok(lease);
                }
                Err(expires_at) => expires_at,
            };

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    name: name.to_string(),
                    waited: started.elapsed(),
                });
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(holder_expiry.min(deadline)) => {}
            }
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), LockError> {
        let removed = self
            .leases
            .remove_if(lease.name(), |_, held| held.token == lease.token());

        match removed {
            Some(_) => {
                self.released.notify_waiters();
                debug!(lock = lease.name(), "lock released");
                Ok(())
            }
            None => Err(LockError::NotHeld {
                name: lease.name().to_string(),
            }),
        }
    }
}
