//! Distributed Lock Service
//!
//! Named mutual-exclusion leases with a bounded wait and explicit release.
//! Order Intake serialises every balance mutation of a `(user, asset)` pair
//! through one lease; Settlement takes a whole [`LockSet`] in the total order
//! defined by [`LockKey`], which is what keeps concurrent settlements free of
//! deadlocks.
//!
//! Leases carry a TTL so a crashed holder cannot block a name forever, and
//! release is token-checked so a holder whose lease expired cannot free a
//! lease that has since been granted to someone else.

pub mod error;
pub mod key;
pub mod memory;
pub mod set;

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub use error::LockError;
pub use key::LockKey;
pub use memory::InMemoryLockService;
pub use set::LockSet;

/// Proof of holding a named lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    name: String,
    token: Uuid,
    expires_at: Instant,
}

impl Lease {
    pub fn new(name: impl Into<String>, token: Uuid, expires_at: Instant) -> Self {
        Self {
            name: name.into(),
            token,
            expires_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> Uuid {
        self.token
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}

/// Lock service interface
#[async_trait]
pub trait LockService: Send + Sync {
    /// Acquire `name`, waiting at most `timeout`
    async fn acquire(&self, name: &str, timeout: Duration) -> Result<Lease, LockError>;

    /// Release a lease obtained from [`LockService::acquire`]
    async fn release(&self, lease: &Lease) -> Result<(), LockError>;
}
