use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire format of a registered payload type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Codec {
    /// Human-readable JSON, readable by producers in other languages.
    #[default]
    Json,
    /// Compact binary via `bitcode`. Rust-to-Rust only.
    Bitcode,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid JSON payload")]
    Json(#[from] serde_json::Error),
    #[error("invalid bitcode payload")]
    Bitcode(#[from] bitcode::Error),
}

impl Codec {
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            Codec::Json => Ok(serde_json::to_vec(value)?),
            Codec::Bitcode => Ok(bitcode::serialize(value)?),
        }
    }

    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            Codec::Json => Ok(serde_json::from_slice(bytes)?),
            Codec::Bitcode => Ok(bitcode::deserialize(bytes)?),
        }
    }
}
