//! Wire protocol for the waypost rendezvous relay.
//!
//! This crate defines the "language" spoken between the relay and its
//! clients:
//!
//! - **Types** ([`Frame`], [`SessionId`], [`ErrorReason`]) — the tagged
//!   records that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those records are
//!   converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing so.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes) and the
//! registry (pairing state). It knows nothing about connections or
//! sessions beyond their identifiers.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Registry (pairing policy)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{ErrorReason, Frame, SessionId};
