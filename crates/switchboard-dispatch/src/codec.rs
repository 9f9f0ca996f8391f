//! # Message Envelope Codec
//!
//! Boundary between the engine's typed values and the transport's untyped
//! payload bytes. Values declared on a route (payloads, replies, and any
//! [`TransferHandle`](switchboard_types::TransferHandle) fields inside them)
//! pass through here in both directions. The transport owns the real wire
//! format; this module owns only the value encoding.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors from the envelope codec.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The raw bytes did not decode into the expected type.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Encode a typed value into raw payload bytes.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, CodecError> {
    bincode::serialize(value)
        .map(Bytes::from)
        .map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode raw payload bytes into a typed value.
pub fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(raw).map_err(|e| CodecError::Decode(e.to_string()))
}
