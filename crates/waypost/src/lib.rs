//! # waypost
//!
//! Rendezvous relay for peer-to-peer signaling.
//!
//! Two parties — a **host** and a **guest** — meet under a
//! client-chosen session identifier and exchange opaque signaling
//! payloads (typically WebRTC offer/answer/candidate blobs). The relay
//! pairs them, forwards `signal` frames verbatim, announces departures,
//! and reclaims dead sockets; it never inspects a payload and never
//! authenticates a claim (first registrant wins, latest claimant
//! evicts).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use waypost::WaypostServerBuilder;
//!
//! # async fn run() -> Result<(), waypost::WaypostError> {
//! let server = WaypostServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod engine;
mod error;
mod server;

pub use error::WaypostError;
pub use server::{WaypostServer, WaypostServerBuilder};

/// Convenience re-exports for embedding or testing the relay.
pub mod prelude {
    pub use crate::{WaypostError, WaypostServer, WaypostServerBuilder};
    pub use waypost_liveness::{LivenessConfig, LivenessMetrics, LivenessMonitor};
    pub use waypost_protocol::{Codec, ErrorReason, Frame, JsonCodec, SessionId};
    pub use waypost_registry::{
        GuestClaim, HostClaim, RegistryError, Released, Role, Session, SessionRegistry,
    };
    pub use waypost_transport::{
        Connection, ConnectionId, Transport, TransportError, WebSocketConnection,
        WebSocketTransport,
    };
}
