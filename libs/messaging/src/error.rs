//! Channel errors

use thiserror::Error;
use types::errors::{Classify, ErrorClass};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("message channel unavailable: {0}")]
    Unavailable(String),

    #[error("message codec error: {0}")]
    Codec(String),

    #[error("subscription closed")]
    Closed,
}

impl Classify for ChannelError {
    fn class(&self) -> ErrorClass {
        match self {
            ChannelError::Unavailable(_) | ChannelError::Closed => ErrorClass::Transient,
            ChannelError::Codec(_) => ErrorClass::Validation,
        }
    }
}
