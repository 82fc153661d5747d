//! Error types for the registry layer.

use waypost_protocol::{ErrorReason, SessionId};
use waypost_transport::ConnectionId;

/// Errors that can occur while claiming a session slot.
///
/// These are the only faults the relay ever reports to a client, and
/// they are answered as typed error frames — a rejected claim never
/// terminates the connection that made it.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A host claim arrived with a missing or empty session identifier.
    #[error("session identifier is missing or empty")]
    InvalidId,

    /// A join targeted a session that doesn't exist or whose host
    /// connection is no longer open.
    #[error("no open host for session {0}")]
    HostNotFound(SessionId),

    /// The claiming connection already holds a role in a session.
    /// Roles are immutable for a connection's lifetime.
    #[error("connection {0} is already bound to a session")]
    AlreadyBound(ConnectionId),
}

impl RegistryError {
    /// The machine-readable reason carried on the wire.
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::InvalidId => ErrorReason::InvalidId,
            Self::HostNotFound(_) => ErrorReason::HostNotFound,
            Self::AlreadyBound(_) => ErrorReason::AlreadyBound,
        }
    }
}
