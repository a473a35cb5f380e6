//! Users and wallets

use crate::ids::{AssetId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// User status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    /// Active and can trade
    Active,
    /// Deactivated; every order is rejected
    Blocked,
}

/// Exchange member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub status: UserStatus,
    /// bcrypt hash of the login password; empty for accounts that cannot
    /// log in
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl User {
    /// A user without login credentials
    pub fn new(id: UserId, email: impl Into<String>, status: UserStatus) -> Self {
        Self {
            id,
            email: email.into(),
            status,
            password_hash: String::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Balance of one asset held by one user
///
/// Invariant: quantity never negative after a committed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub asset_id: AssetId,
    pub quantity: Decimal,
}

impl Wallet {
    pub fn new(user_id: UserId, asset_id: AssetId, quantity: Decimal) -> Self {
        Self { user_id, asset_id, quantity }
    }

    /// Check whether `amount` can be debited without going negative
    pub fn covers(&self, amount: Decimal) -> bool {
        self.quantity >= amount
    }
}
