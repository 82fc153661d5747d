//! The session registry: tracks every pairing slot and who occupies it.
//!
//! This is the central piece of the relay. It's responsible for:
//! - Creating sessions when a connection claims a host slot
//! - Filling and clearing guest slots on join/leave
//! - Evicting stale occupants when a claim collides (latest wins)
//! - Resolving the peer for signal forwarding
//! - Unbinding closed connections exactly once
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself — it uses plain
//! `HashMap`s, not concurrent ones. This is intentional: the registry
//! has a single logical writer (the relay's event flow) and is wrapped
//! in a mutex at the server level, so every operation here runs to
//! completion without ever being observed half-done.

use std::collections::HashMap;

use waypost_protocol::SessionId;
use waypost_transport::{Connection, ConnectionId};

use crate::{RegistryError, Role, Session};

/// A connection's immutable role/session assignment.
///
/// Created by the first successful claim, removed by [`release`]
/// (or never created, for connections that never claim anything).
///
/// [`release`]: SessionRegistry::release
#[derive(Debug, Clone)]
struct Binding {
    role: Role,
    session_id: SessionId,
}

/// The outcome of a successful host claim.
///
/// `evicted` holds the previous host (and its guest, if any) when the
/// claim preempted an existing session. The engine owns closing them —
/// the registry never performs I/O.
#[derive(Debug)]
pub struct HostClaim<C: Connection + Clone> {
    /// Connections displaced by this claim, to be closed by the caller.
    pub evicted: Vec<C>,
}

/// The outcome of a successful guest claim.
#[derive(Debug)]
pub struct GuestClaim<C: Connection + Clone> {
    /// The session's host, for the `guest-joined` notification.
    pub host: C,
    /// A previous guest displaced by this claim, to be closed.
    pub evicted: Option<C>,
}

/// What a [`release`](SessionRegistry::release) found, and who to notify.
#[derive(Debug)]
pub enum Released<C: Connection + Clone> {
    /// The connection was the session's current host. The session is
    /// gone; the guest (if any) gets a `host-left`.
    Host {
        session_id: SessionId,
        guest: Option<C>,
    },
    /// The connection was a guest. The session survives; the host is
    /// returned for a `guest-left` when it is still open.
    Guest {
        session_id: SessionId,
        host: Option<C>,
    },
    /// Nothing to do: the connection never claimed a role, was already
    /// released, or was a host stale from an earlier eviction.
    Unbound,
}

/// Maps session identifiers to their occupants.
///
/// ## Lifecycle
///
/// ```text
/// claim_host() ──→ [host waiting] ──claim_guest()──→ [paired]
///      │                 │                              │
///      │ (re-claim: no-op)│ release(guest) ──────────────┘
///      │                 ▼                    (back to host waiting)
///      │          release(host) ──→ session removed
///      └─ collision: previous occupants evicted, fresh record
/// ```
pub struct SessionRegistry<C: Connection + Clone> {
    /// Live sessions, keyed by the client-chosen identifier.
    sessions: HashMap<SessionId, Session<C>>,

    /// Role/session assignment per connection.
    ///
    /// Kept alongside `sessions` so a close event can be resolved
    /// without scanning every session. An entry is written by the
    /// first successful claim and never rewritten to a different
    /// role or session — connections cannot switch sides.
    bindings: HashMap<ConnectionId, Binding>,
}

impl<C: Connection + Clone> SessionRegistry<C> {
    /// Creates a new, empty registry.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            bindings: HashMap::new(),
        }
    }

    /// Claims `session_id` for `conn` as its host.
    ///
    /// Session identifiers are first-registrant, latest-claimant-wins:
    /// a claim over an id held by a *different* host preempts it — the
    /// previous host and its guest come back in [`HostClaim::evicted`]
    /// for the caller to close. A re-claim by the current host is a
    /// no-op success that leaves the guest slot untouched.
    ///
    /// # Errors
    /// - [`RegistryError::InvalidId`] — empty/missing identifier.
    /// - [`RegistryError::AlreadyBound`] — `conn` already holds a
    ///   different role or session.
    pub fn claim_host(
        &mut self,
        session_id: &SessionId,
        conn: &C,
    ) -> Result<HostClaim<C>, RegistryError> {
        if session_id.is_empty() {
            return Err(RegistryError::InvalidId);
        }
        if let Some(binding) = self.bindings.get(&conn.id()) {
            if binding.role != Role::Host || binding.session_id != *session_id {
                return Err(RegistryError::AlreadyBound(conn.id()));
            }
        }

        if let Some(session) = self.sessions.get(session_id) {
            if session.host.id() == conn.id() {
                // Re-claim by the current host (e.g. a client retry):
                // session and guest stay exactly as they are.
                tracing::debug!(%session_id, conn = %conn.id(), "host re-claimed session");
                return Ok(HostClaim {
                    evicted: Vec::new(),
                });
            }
        }

        let mut evicted = Vec::new();
        if let Some(prev) = self.sessions.remove(session_id) {
            tracing::info!(
                %session_id,
                prev_host = %prev.host.id(),
                new_host = %conn.id(),
                "host claim preempts existing session"
            );
            // The displaced occupants keep their bindings until their
            // close events arrive; release() recognizes them as stale.
            evicted.push(prev.host);
            evicted.extend(prev.guest);
        }

        self.sessions.insert(
            session_id.clone(),
            Session {
                host: conn.clone(),
                guest: None,
            },
        );
        self.bindings.insert(
            conn.id(),
            Binding {
                role: Role::Host,
                session_id: session_id.clone(),
            },
        );

        tracing::info!(%session_id, conn = %conn.id(), "host claimed session");
        Ok(HostClaim { evicted })
    }

    /// Claims the guest slot of `session_id` for `conn`.
    ///
    /// A previous guest on the slot is displaced and returned in
    /// [`GuestClaim::evicted`]. Re-joining the same session with the
    /// same connection succeeds idempotently.
    ///
    /// # Errors
    /// - [`RegistryError::HostNotFound`] — no session for this id, or
    ///   its host connection is no longer open.
    /// - [`RegistryError::AlreadyBound`] — `conn` already holds a
    ///   different role or session.
    pub fn claim_guest(
        &mut self,
        session_id: &SessionId,
        conn: &C,
    ) -> Result<GuestClaim<C>, RegistryError> {
        if let Some(binding) = self.bindings.get(&conn.id()) {
            if binding.role != Role::Guest || binding.session_id != *session_id {
                return Err(RegistryError::AlreadyBound(conn.id()));
            }
        }

        let session = self
            .sessions
            .get_mut(session_id)
            .filter(|s| s.host.is_open())
            .ok_or_else(|| RegistryError::HostNotFound(session_id.clone()))?;

        let mut evicted = None;
        if let Some(prev) = session.guest.take() {
            if prev.id() != conn.id() {
                tracing::info!(
                    %session_id,
                    prev_guest = %prev.id(),
                    new_guest = %conn.id(),
                    "guest claim displaces previous guest"
                );
                evicted = Some(prev);
            }
        }
        session.guest = Some(conn.clone());
        let host = session.host.clone();

        self.bindings.insert(
            conn.id(),
            Binding {
                role: Role::Guest,
                session_id: session_id.clone(),
            },
        );

        tracing::info!(%session_id, conn = %conn.id(), "guest joined session");
        Ok(GuestClaim { host, evicted })
    }

    /// Resolves the other endpoint of the sender's session.
    ///
    /// `session_id` is the identifier the sender *declared* on its
    /// signal frame; it must match the sender's own binding or no peer
    /// is returned — a connection can never relay into a session it
    /// doesn't occupy. Also `None` when the sender is unbound, the
    /// session is gone, or the opposite slot is empty.
    pub fn lookup_peer(&self, conn_id: ConnectionId, session_id: &SessionId) -> Option<&C> {
        let binding = self.bindings.get(&conn_id)?;
        if binding.session_id != *session_id {
            return None;
        }
        let session = self.sessions.get(session_id)?;
        match binding.role {
            Role::Host => session.guest.as_ref(),
            Role::Guest => Some(&session.host),
        }
    }

    /// Unbinds a closed connection and reports who to notify.
    ///
    /// Idempotent: a second release for the same connection (or one
    /// for a connection that never claimed anything) is [`Released::Unbound`].
    ///
    /// A host release tears the session down only when the releasing
    /// connection is the session's *current* host — the close event of
    /// a host displaced by eviction must not delete its successor's
    /// session.
    pub fn release(&mut self, conn_id: ConnectionId) -> Released<C> {
        let Some(binding) = self.bindings.remove(&conn_id) else {
            return Released::Unbound;
        };
        let session_id = binding.session_id;

        match binding.role {
            Role::Host => {
                let is_current = self
                    .sessions
                    .get(&session_id)
                    .is_some_and(|s| s.host.id() == conn_id);
                if !is_current {
                    tracing::debug!(%session_id, conn = %conn_id, "stale host released");
                    return Released::Unbound;
                }
                let guest = self
                    .sessions
                    .remove(&session_id)
                    .and_then(|session| session.guest);
                tracing::info!(%session_id, conn = %conn_id, "host left, session removed");
                Released::Host { session_id, guest }
            }
            Role::Guest => {
                let Some(session) = self.sessions.get_mut(&session_id) else {
                    return Released::Unbound;
                };
                if session.guest.as_ref().is_some_and(|g| g.id() == conn_id) {
                    session.guest = None;
                }
                // The departure notice goes to any still-open host,
                // even when the slot had already been re-occupied.
                let host = session.host.is_open().then(|| session.host.clone());
                tracing::info!(%session_id, conn = %conn_id, "guest left");
                Released::Guest { session_id, host }
            }
        }
    }

    /// Looks up a session by identifier.
    pub fn session(&self, session_id: &SessionId) -> Option<&Session<C>> {
        self.sessions.get(session_id)
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl<C: Connection + Clone> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}
