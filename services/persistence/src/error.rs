//! Store errors

use rust_decimal::Decimal;
use thiserror::Error;
use types::errors::{Classify, ErrorClass};
use types::ids::{AssetId, UserId};
use types::trade::TradeKey;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient funds in wallet ({user_id}, {asset_id}): balance {balance}, delta {delta}")]
    InsufficientFunds {
        user_id: UserId,
        asset_id: AssetId,
        balance: Decimal,
        delta: Decimal,
    },

    #[error("trade {}/{} already recorded", .0.taker_order_id, .0.maker_order_id)]
    DuplicateTrade(TradeKey),

    #[error("balance of wallet ({user_id}, {asset_id}) would exceed the decimal range")]
    BalanceOverflow { user_id: UserId, asset_id: AssetId },

    #[error("email {0} is already registered")]
    DuplicateEmail(String),
}

impl Classify for StoreError {
    fn class(&self) -> ErrorClass {
        match self {
            StoreError::Unavailable(_) => ErrorClass::Transient,
            StoreError::InsufficientFunds { .. }
            | StoreError::DuplicateTrade(_)
            | StoreError::BalanceOverflow { .. }
            | StoreError::DuplicateEmail(_) => ErrorClass::BusinessRule,
        }
    }
}
