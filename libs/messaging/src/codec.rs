//! JSON payload codec

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ChannelError;

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, ChannelError> {
    serde_json::to_vec(value).map_err(|e| ChannelError::Codec(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(payload: &[u8]) -> Result<T, ChannelError> {
    serde_json::from_slice(payload).map_err(|e| ChannelError::Codec(e.to_string()))
}
