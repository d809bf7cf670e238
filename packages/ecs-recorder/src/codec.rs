//! Pluggable managed-component codec.
//!
//! The core treats managed components as opaque payloads; any compact
//! self-describing codec satisfies the contract. `JsonCodec` is the
//! default, backed by `serde_json`.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{RecorderError, RecorderResult};

pub trait ManagedCodec<T> {
    fn serialize(&self, value: &T) -> RecorderResult<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> RecorderResult<T>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> ManagedCodec<T> for JsonCodec {
    fn serialize(&self, value: &T) -> RecorderResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| RecorderError::Codec(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> RecorderResult<T> {
        serde_json::from_slice(bytes).map_err(|e| RecorderError::Codec(e.to_string()))
    }
}
