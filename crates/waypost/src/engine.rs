//! Per-connection relay engine: frame dispatch and release-on-close.
//!
//! Each accepted connection gets its own Tokio task running this loop:
//!   1. Receive bytes → decode a [`Frame`] (or silently discard junk)
//!   2. Dispatch: `host` / `join` mutate the registry, `signal` is
//!      forwarded opaquely to the session peer
//!   3. On close (clean, errored, or liveness-terminated): release the
//!      connection from the registry and notify whoever remains
//!
//! Every outbound frame goes through [`send_or_drop`]: sends are
//! fire-and-forget, and a frame that cannot be encoded or written is
//! dropped — never retried, never escalated, never fatal to the relay.

use std::sync::Arc;

use waypost_protocol::{Codec, Frame};
use waypost_registry::Released;
use waypost_transport::{Connection, TransportError};

use crate::WaypostError;
use crate::server::ServerState;

/// Handles a single connection from accept to release.
pub(crate) async fn handle_connection<C, K>(conn: C, state: Arc<ServerState<C, K>>)
where
    C: Connection<Error = TransportError> + Clone,
    K: Codec,
{
    let conn_id = conn.id();
    tracing::debug!(%conn_id, "handling new connection");

    loop {
        let data = match conn.recv().await {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        };

        let frame: Frame = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                // The relay doesn't police inbound shape: unparseable
                // frames are dropped without an answer.
                tracing::debug!(%conn_id, error = %e, "discarding malformed frame");
                continue;
            }
        };

        dispatch(&conn, &state, frame).await;
    }

    teardown(&conn, &state).await;
}

/// Routes one decoded frame.
async fn dispatch<C, K>(conn: &C, state: &Arc<ServerState<C, K>>, frame: Frame)
where
    C: Connection<Error = TransportError> + Clone,
    K: Codec,
{
    match frame {
        Frame::Host { session_id } => {
            let claim = state.registry.lock().await.claim_host(&session_id, conn);
            match claim {
                Ok(claim) => {
                    for stale in claim.evicted {
                        let _ = stale.close().await;
                    }
                    send_or_drop(state, conn, &Frame::HostOk { session_id }).await;
                }
                Err(e) => {
                    tracing::debug!(conn = %conn.id(), error = %e, "host claim rejected");
                    send_or_drop(state, conn, &Frame::HostError { reason: e.reason() })
                        .await;
                }
            }
        }

        Frame::Join { session_id } => {
            let claim = state.registry.lock().await.claim_guest(&session_id, conn);
            match claim {
                Ok(claim) => {
                    if let Some(stale) = claim.evicted {
                        let _ = stale.close().await;
                    }
                    send_or_drop(
                        state,
                        conn,
                        &Frame::JoinOk {
                            session_id: session_id.clone(),
                        },
                    )
                    .await;
                    send_or_drop(state, &claim.host, &Frame::GuestJoined { session_id })
                        .await;
                }
                Err(e) => {
                    tracing::debug!(conn = %conn.id(), error = %e, "join rejected");
                    send_or_drop(state, conn, &Frame::JoinError { reason: e.reason() })
                        .await;
                }
            }
        }

        Frame::Signal { session_id, payload } => {
            // Clone the peer handle inside the lock scope; the forward
            // itself happens outside it.
            let peer = state
                .registry
                .lock()
                .await
                .lookup_peer(conn.id(), &session_id)
                .cloned();
            match peer {
                Some(peer) => {
                    send_or_drop(state, &peer, &Frame::Signal { session_id, payload })
                        .await;
                }
                None => {
                    // No peer yet, or a session the sender doesn't
                    // occupy: dropped, not queued, no error frame.
                    tracing::trace!(conn = %conn.id(), %session_id, "signal has no peer, dropped");
                }
            }
        }

        // Server-direction frames arriving inbound.
        other => {
            tracing::debug!(conn = %conn.id(), frame = ?other, "ignoring unexpected frame");
        }
    }
}

/// Removes a closed connection from the server and the registry, and
/// delivers the departure notification its release calls for.
async fn teardown<C, K>(conn: &C, state: &Arc<ServerState<C, K>>)
where
    C: Connection<Error = TransportError> + Clone,
    K: Codec,
{
    let conn_id = conn.id();
    state.connections.lock().await.remove(&conn_id);

    match state.registry.lock().await.release(conn_id) {
        Released::Host { session_id, guest } => {
            if let Some(guest) = guest {
                send_or_drop(state, &guest, &Frame::HostLeft { session_id }).await;
            }
        }
        Released::Guest { session_id, host } => {
            if let Some(host) = host {
                send_or_drop(state, &host, &Frame::GuestLeft { session_id }).await;
            }
        }
        Released::Unbound => {}
    }

    let _ = conn.close().await;
    tracing::debug!(%conn_id, "connection released");
}

/// Best-effort send: encodes and writes the frame, and drops it with a
/// debug log when either step fails.
///
/// This is the relay's documented send contract — a peer whose socket
/// can't take the frame simply misses it. Nothing is buffered or
/// retried, and one bad participant never propagates a failure.
async fn send_or_drop<C, K>(state: &ServerState<C, K>, conn: &C, frame: &Frame)
where
    C: Connection<Error = TransportError> + Clone,
    K: Codec,
{
    if let Err(e) = try_send(&state.codec, conn, frame).await {
        tracing::debug!(conn = %conn.id(), error = %e, "dropping undeliverable frame");
    }
}

async fn try_send<C, K>(codec: &K, conn: &C, frame: &Frame) -> Result<(), WaypostError>
where
    C: Connection<Error = TransportError>,
    K: Codec,
{
    let bytes = codec.encode(frame)?;
    conn.send(&bytes).await?;
    Ok(())
}
