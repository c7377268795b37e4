//! Serialization and deserialization for the Taskboard wire protocol.
//!
//! Each WebSocket frame carries one self-contained [`Task`] encoded as JSON.
//! Timestamps are written as RFC 3339 strings with full sub-second precision,
//! so a decode of an encoded task yields an identical value.

use crate::task::Task;

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// Frame carried no payload.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// Encodes a [`Task`] into a JSON string suitable for a text frame.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the task cannot be serialized.
pub fn encode(task: &Task) -> Result<String, CodecError> {
    serde_json::to_string(task).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`Task`] from the JSON text of a frame.
///
/// # Errors
///
/// Returns `CodecError::InvalidFrame` for an empty frame, or
/// `CodecError::Serialization` if the text is not a structurally valid task.
pub fn decode(text: &str) -> Result<Task, CodecError> {
    decode_bytes(text.as_bytes())
}

/// Decodes a [`Task`] from raw frame bytes holding UTF-8 JSON.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_bytes(bytes: &[u8]) -> Result<Task, CodecError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(CodecError::InvalidFrame("empty payload".into()));
    }
    serde_json::from_slice(bytes).map_err(|e| CodecError::Serialization(e.to_string()))
}
