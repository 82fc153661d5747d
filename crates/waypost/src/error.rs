//! Unified error type for the waypost relay.

use waypost_protocol::ProtocolError;
use waypost_transport::TransportError;

/// Top-level error that wraps the crate-specific errors.
///
/// Only infrastructure faults surface here (binding the listener,
/// encoding or writing a frame). Registry rejections never become a
/// `WaypostError` — they are answered to the offending client as typed
/// error frames and the relay carries on.
#[derive(Debug, thiserror::Error)]
pub enum WaypostError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
