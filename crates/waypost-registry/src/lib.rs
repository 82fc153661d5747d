//! Session registry for the waypost relay.
//!
//! This crate owns all pairing policy: who holds a session identifier,
//! who gets evicted when a claim collides, and who must be notified
//! when an endpoint disappears. It is the only stateful piece of the
//! relay.
//!
//! 1. **Claims** — a `host` frame creates (or preempts) a session; a
//!    `join` frame fills its guest slot ([`SessionRegistry`]).
//! 2. **Peer lookup** — `signal` frames are forwarded to whatever
//!    connection currently occupies the opposite role slot.
//! 3. **Release** — a closed connection is unbound exactly once, and
//!    the registry reports who to tell about it.
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay Engine (above)  ← performs the I/O the registry decides on
//!     ↕
//! Registry (this crate) ← pairing, eviction, and release policy
//!     ↕
//! Protocol / Transport (below)  ← SessionId, Connection handles
//! ```
//!
//! The registry itself never touches the network: claim and release
//! operations return the affected connection handles ([`HostClaim`],
//! [`GuestClaim`], [`Released`]) and the engine closes or notifies
//! them. That keeps this crate synchronous and exhaustively testable
//! with mock connections.

mod error;
mod registry;
mod session;

pub use error::RegistryError;
pub use registry::{GuestClaim, HostClaim, Released, SessionRegistry};
pub use session::{Role, Session};
