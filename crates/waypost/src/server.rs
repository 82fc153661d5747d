//! `WaypostServer` builder and accept loop.
//!
//! This is the entry point for running the relay. It ties together all
//! the layers: transport → protocol → registry, with the liveness
//! monitor sweeping alongside.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use waypost_liveness::{LivenessConfig, LivenessMonitor};
use waypost_protocol::{Codec, JsonCodec};
use waypost_registry::SessionRegistry;
use waypost_transport::{
    Connection, ConnectionId, Transport, WebSocketConnection, WebSocketTransport,
};

use crate::WaypostError;
use crate::engine::handle_connection;

/// Shared server state passed to each connection task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The
/// registry has a single logical writer: every mutation happens inside
/// one mutex scope and runs to completion before any other event can
/// observe it, and no lock is ever held across peer I/O.
pub(crate) struct ServerState<C: Connection + Clone, K: Codec> {
    pub(crate) registry: Mutex<SessionRegistry<C>>,
    /// Every open connection, claimed or not — the liveness sweep
    /// probes unbound sockets too.
    pub(crate) connections: Mutex<HashMap<ConnectionId, C>>,
    pub(crate) codec: K,
}

/// Builder for configuring and starting a relay server.
///
/// # Example
///
/// ```rust,ignore
/// use waypost::WaypostServerBuilder;
///
/// let server = WaypostServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct WaypostServerBuilder {
    bind_addr: String,
    liveness: LivenessConfig,
}

impl WaypostServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            liveness: LivenessConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the liveness monitor configuration.
    pub fn liveness(mut self, config: LivenessConfig) -> Self {
        self.liveness = config;
        self
    }

    /// Builds the server, binding the listener.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport` — the stack every
    /// browser client speaks.
    pub async fn build(self) -> Result<WaypostServer<JsonCodec>, WaypostError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let state = Arc::new(ServerState {
            registry: Mutex::new(SessionRegistry::new()),
            connections: Mutex::new(HashMap::new()),
            codec: JsonCodec,
        });

        Ok(WaypostServer {
            transport,
            liveness: self.liveness,
            state,
        })
    }
}

impl Default for WaypostServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct WaypostServer<K: Codec> {
    transport: WebSocketTransport,
    liveness: LivenessConfig,
    state: Arc<ServerState<WebSocketConnection, K>>,
}

impl<K: Codec> WaypostServer<K> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the relay: the liveness sweep task plus the accept loop.
    ///
    /// Each accepted connection gets its own engine task. Runs until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), WaypostError> {
        tracing::info!("waypost relay running");

        let mut monitor = LivenessMonitor::new(self.liveness.clone());
        let sweep_state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                monitor.wait_for_sweep().await;
                // Snapshot the handles so the sweep never holds the
                // connection-set lock across probe writes.
                let connections: Vec<_> = sweep_state
                    .connections
                    .lock()
                    .await
                    .values()
                    .cloned()
                    .collect();
                let outcome = monitor.sweep(connections).await;
                if !outcome.terminated.is_empty() {
                    tracing::info!(
                        count = outcome.terminated.len(),
                        "reclaimed dead connections"
                    );
                }
            }
        });

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    state.connections.lock().await.insert(conn.id(), conn.clone());
                    tokio::spawn(async move {
                        handle_connection(conn, state).await;
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
