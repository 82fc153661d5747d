//! Session types: the records behind the registry map.

use std::fmt;

use waypost_transport::Connection;

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Which end of a session a connection occupies.
///
/// Assigned at most once per connection lifetime. A connection that
/// wants a different role or session has to disconnect and come back —
/// the registry refuses to rebind a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The connection that claimed the session identifier.
    Host,
    /// The connection that joined the existing session.
    Guest,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Guest => f.write_str("guest"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One pairing slot: a host connection and at most one guest.
///
/// A session record exists if and only if it has a host — the guest
/// slot fills and empties independently within the record's lifetime,
/// but the record itself is created by a host claim and deleted the
/// moment the host's release is processed.
///
/// The handles stored here are clones; the transport owns the sockets.
#[derive(Debug)]
pub struct Session<C: Connection + Clone> {
    pub(crate) host: C,
    pub(crate) guest: Option<C>,
}

impl<C: Connection + Clone> Session<C> {
    /// The connection currently holding the host slot.
    pub fn host(&self) -> &C {
        &self.host
    }

    /// The connection currently holding the guest slot, if any.
    pub fn guest(&self) -> Option<&C> {
        self.guest.as_ref()
    }
}
