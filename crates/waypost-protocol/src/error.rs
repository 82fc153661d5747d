//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding frames.
///
/// Decode failures are expected operation for a public relay — clients
/// send junk — so the engine logs and discards them rather than
/// surfacing anything to the peer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a frame into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (malformed JSON, missing fields, or an
    /// unknown `type` tag).
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
