//! Intake and relay errors

use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

use lock_service::LockError;
use messaging::ChannelError;
use persistence::StoreError;
use types::errors::{Classify, ErrorClass};
use types::ids::{OrderId, PairCode, UserId};

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("invalid order: {0}")]
    Validation(String),

    #[error("unknown trading pair {0}")]
    UnknownPair(PairCode),

    #[error("unknown user {0}")]
    UnknownUser(UserId),

    #[error("user {0} is blocked")]
    UserBlocked(UserId),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Decimal, available: Decimal },

    #[error("funding wallet is busy: {0}")]
    LockUnavailable(#[source] LockError),

    #[error(transparent)]
    Store(StoreError),

    #[error("failed to encode order: {0}")]
    Codec(#[source] ChannelError),

    #[error("order {order_id} accepted but not yet published")]
    PublishFailed { order_id: OrderId },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<StoreError> for IntakeError {
    fn from(err: StoreError) -> Self {
        match err {
            // Only reachable if the balance moved without the wallet lock
            StoreError::InsufficientFunds { balance, delta, .. } => IntakeError::InsufficientBalance {
                required: -delta,
                available: balance,
            },
            other => IntakeError::Store(other),
        }
    }
}

impl Classify for IntakeError {
    fn class(&self) -> ErrorClass {
        match self {
            IntakeError::Validation(_) | IntakeError::UnknownPair(_) | IntakeError::UnknownUser(_) => {
                ErrorClass::Validation
            }
            IntakeError::UserBlocked(_) | IntakeError::InsufficientBalance { .. } => ErrorClass::BusinessRule,
            IntakeError::LockUnavailable(_) | IntakeError::Timeout(_) => ErrorClass::Transient,
            IntakeError::Store(err) => err.class(),
            IntakeError::Codec(_) | IntakeError::PublishFailed { .. } => ErrorClass::Fatal,
        }
    }
}

/// Outbox relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("publish failed: {0}")]
    Publish(#[from] ChannelError),
}

impl Classify for RelayError {
    fn class(&self) -> ErrorClass {
        match self {
            RelayError::Store(err) => err.class(),
            RelayError::Publish(err) => err.class(),
        }
    }
}
