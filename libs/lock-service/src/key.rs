//! Lock names
//!
//! The derived `Ord` is the global acquisition order: every order lock sorts
//! before every wallet lock, and within a kind keys sort by ascending ids.
//! Any two actors that need overlapping keys therefore request them in the
//! same relative order, whichever side of a trade they are on.

use std::fmt;
use types::ids::{AssetId, OrderId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockKey {
    /// Fill state of one order
    Order(OrderId),
    /// Balance of one asset held by one user
    Wallet { user_id: UserId, asset_id: AssetId },
}

impl LockKey {
    pub fn wallet(user_id: UserId, asset_id: AssetId) -> Self {
        LockKey::Wallet { user_id, asset_id }
    }

    /// Name under which the lease is registered
    pub fn name(&self) -> String {
        match self {
            LockKey::Order(order_id) => format!("lock#order#{order_id}"),
            LockKey::Wallet { user_id, asset_id } => format!("lock#wallet#{user_id}#{asset_id}"),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
