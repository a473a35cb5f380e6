//! Settlement errors

use std::time::Duration;
use thiserror::Error;

use lock_service::LockError;
use messaging::ChannelError;
use persistence::StoreError;
use types::errors::{Classify, ErrorClass, OrderError};
use types::ids::{OrderId, PairId};

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("invalid trade: {0}")]
    Validation(String),

    #[error("unknown trading pair {0}")]
    UnknownPair(PairId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {order_id} does not match trade: {detail}")]
    OrderMismatch { order_id: OrderId, detail: &'static str },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("trade channel failed: {0}")]
    Channel(#[from] ChannelError),

    #[error("settlement timed out after {0:?}")]
    Timeout(Duration),
}

impl Classify for SettlementError {
    fn class(&self) -> ErrorClass {
        match self {
            SettlementError::Validation(_) | SettlementError::UnknownPair(_) => ErrorClass::Validation,
            SettlementError::OrderNotFound(_) | SettlementError::OrderMismatch { .. } => ErrorClass::Fatal,
            SettlementError::Order(err) => err.class(),
            SettlementError::Lock(err) => err.class(),
            SettlementError::Store(err) => err.class(),
            SettlementError::Channel(err) => err.class(),
            SettlementError::Timeout(_) => ErrorClass::Transient,
        }
    }
}
