//! Lock service errors

use std::time::Duration;
use thiserror::Error;
use types::errors::{Classify, ErrorClass};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("timed out after {waited:?} waiting for lock {name}")]
    Timeout { name: String, waited: Duration },

    #[error("lock {name} is not held by this lease")]
    NotHeld { name: String },

    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}

impl Classify for LockError {
    fn class(&self) -> ErrorClass {
        match self {
            LockError::Timeout { .. } | LockError::Unavailable(_) => ErrorClass::Transient,
            // Releasing something we no longer own means mutual exclusion was lost
            LockError::NotHeld { .. } => ErrorClass::Fatal,
        }
    }
}
