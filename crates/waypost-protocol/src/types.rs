//! Core protocol types for waypost's wire format.
//!
//! Every message on the wire is a [`Frame`]: an attribute-tagged JSON
//! record with a `type` field and camelCase attributes, e.g.
//! `{"type":"host","sessionId":"abc"}`. The same sum type covers both
//! directions — the relay decodes inbound bytes once at the boundary
//! and matches exhaustively; variants that only ever travel
//! server-to-client simply fall into the ignore arm when a client
//! sends them.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A client-chosen session identifier.
///
/// Opaque to the relay: any non-empty string names a pairing slot.
/// `#[serde(transparent)]` keeps the wire form a plain JSON string.
///
/// The empty id is representable (and is the `Default`) because the
/// claim frames decode a *missing* `sessionId` field as empty — the
/// registry folds both into the same `InvalidId` rejection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Creates a session id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Whether the identifier is empty (invalid for a host claim).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrows the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ---------------------------------------------------------------------------
// Error reasons
// ---------------------------------------------------------------------------

/// Machine-readable reason carried by `host-error` / `join-error` frames.
///
/// These are the only failures ever reported to a client; everything
/// else the relay absorbs silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorReason {
    /// The claim's session identifier was missing or empty.
    InvalidId,
    /// `join` targeted a session with no open host.
    HostNotFound,
    /// The connection already holds a role in another session.
    AlreadyBound,
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidId => "invalid-id",
            Self::HostNotFound => "host-not-found",
            Self::AlreadyBound => "already-bound",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Frame — the wire tagged union
// ---------------------------------------------------------------------------

/// One wire message, client→server or server→client.
///
/// `#[serde(tag = "type", rename_all = "kebab-case")]` produces the
/// internally tagged form the relay's clients speak:
/// `{"type":"join-error","reason":"host-not-found"}`.
///
/// The `signal` payload is a raw [`serde_json::Value`]: the relay never
/// looks inside it, it is re-serialized verbatim for the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Frame {
    // -- Client → Server --
    /// Claim (or re-claim) a session identifier as its host.
    Host {
        #[serde(default)]
        session_id: SessionId,
    },

    /// Join an existing session as its guest.
    Join {
        #[serde(default)]
        session_id: SessionId,
    },

    /// Opaque payload for the other endpoint of the sender's session.
    /// Travels both directions unchanged.
    Signal {
        session_id: SessionId,
        payload: serde_json::Value,
    },

    // -- Server → Client --
    /// The host claim succeeded.
    HostOk { session_id: SessionId },

    /// The host claim was rejected.
    HostError { reason: ErrorReason },

    /// The join succeeded; sent to the joining guest.
    JoinOk { session_id: SessionId },

    /// The join was rejected.
    JoinError { reason: ErrorReason },

    /// A guest joined the recipient's session; sent to the host.
    GuestJoined { session_id: SessionId },

    /// The session's host disconnected; the session is gone.
    HostLeft { session_id: SessionId },

    /// The session's guest disconnected; the session remains open.
    GuestLeft { session_id: SessionId },
}

// =========================================================================
// Tests
// =========================================================================
