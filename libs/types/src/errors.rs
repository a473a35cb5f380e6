//! Error taxonomy shared by every service
//!
//! Each service error classifies itself into one of four classes. The class
//! decides whether a message is acknowledged or left for redelivery, and how
//! the edge maps the failure for the caller.

use crate::ids::OrderId;
use crate::numeric::Quantity;
use crate::order::OrderStatus;
use thiserror::Error;

/// Broad failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad request shape or unknown reference data; nothing mutated
    Validation,
    /// Rule violation such as insufficient balance; not retried
    BusinessRule,
    /// Infrastructure hiccup; leave the message unacknowledged
    Transient,
    /// Broken invariant between subsystems; needs reconciliation
    Fatal,
}

/// Errors that know their class
pub trait Classify {
    fn class(&self) -> ErrorClass;

    fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

/// Order state machine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("order {order_id} already in terminal state {status:?}")]
    AlreadyTerminal { order_id: OrderId, status: OrderStatus },

    #[error("fill of {fill} would overfill order {order_id} (quantity {quantity}, filled {filled})")]
    Overfill {
        order_id: OrderId,
        quantity: Quantity,
        filled: Quantity,
        fill: Quantity,
    },
}

impl Classify for OrderError {
    fn class(&self) -> ErrorClass {
        match self {
            OrderError::InvalidQuantity(_) => ErrorClass::Validation,
            OrderError::AlreadyTerminal { .. }
            | OrderError::Overfill { .. } => ErrorClass::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_error_display() {
        let err = OrderError::InvalidQuantity("-1".to_string());
        assert_eq!(err.to_string(), "invalid quantity: -1");
    }

    #[test]
    fn test_overfill_is_fatal_not_retryable() {
        let err = OrderError::Overfill {
            order_id: OrderId::new(1),
            quantity: Quantity::from_u64(10),
            filled: Quantity::from_u64(8),
            fill: Quantity::from_u64(4),
        };
        assert_eq!(err.class(), ErrorClass::Fatal);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("order 1"));
    }
}
