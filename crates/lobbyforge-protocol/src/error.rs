//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding lobby traffic.
///
/// Each Lobbyforge crate owns its error enum, so a `ProtocolError` always
/// means "the bytes or op codes were wrong", never "the store failed".
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, wrong types.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
