//! JSON serialization for `BoardSync` wire payloads.
//!
//! Relay frames travel as WebSocket text frames and their `body` fields
//! carry JSON text of their own (task records, move commands), so both
//! layers go through the same pair of helpers.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    /// The input was not valid JSON for the expected type.
    #[error("deserialization error: {0}")]
    Deserialization(#[source] serde_json::Error),
}

/// Encodes a value as compact JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if the value cannot be serialized.
pub fn encode<T: Serialize>(value: &T) -> Result<String, CodecError> {
    serde_json::to_string(value).map_err(CodecError::Serialization)
}

/// Decodes a value from JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Deserialization`] if the text is not valid JSON
/// for `T`.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Deserialization)
}
