//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The listener does double duty, the way small signaling deployments
//! expect: WebSocket upgrade requests become relay connections, and any
//! other HTTP request (a load balancer probe, a curl) gets a one-line
//! plaintext health response on the same port.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long a close is allowed to spend flushing the close frame before
/// the connection is abandoned anyway.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Body of the plaintext reply to non-WebSocket requests.
const HEALTH_BODY: &str = "waypost relay is running.\n";

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        // Only listener failures bubble up; a single misbehaving client
        // (bad handshake, plain HTTP) never stops the accept loop.
        loop {
            let (stream, addr) = self
                .listener
                .accept()
                .await
                .map_err(TransportError::AcceptFailed)?;

            if !is_upgrade_request(&stream).await {
                respond_health(stream).await;
                continue;
            }

            let ws = match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
                    continue;
                }
            };

            let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
            tracing::debug!(%id, %addr, "accepted WebSocket connection");

            let (sink, stream) = ws.split();
            return Ok(WebSocketConnection {
                id,
                sink: Arc::new(Mutex::new(sink)),
                stream: Arc::new(Mutex::new(stream)),
                open: Arc::new(AtomicBool::new(true)),
                alive: Arc::new(AtomicBool::new(true)),
                closed: Arc::new(Notify::new()),
            });
        }
    }
}

/// Peeks at the request head to decide whether this is a WebSocket
/// upgrade. A request line plus headers fits a single segment in
/// practice; anything we cannot classify is treated as plain HTTP.
async fn is_upgrade_request(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 1024];
    match stream.peek(&mut buf).await {
        Ok(n) if n > 0 => {
            let head = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();
            head.contains("upgrade: websocket") || head.contains("sec-websocket-key")
        }
        _ => false,
    }
}

/// Answers a plain HTTP request with the health line and hangs up.
async fn respond_health(mut stream: TcpStream) {
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        HEALTH_BODY.len(),
        HEALTH_BODY
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to write health response");
    }
    let _ = stream.shutdown().await;
}

/// A single WebSocket connection.
///
/// A cheap-to-clone handle: the sink and stream halves of the socket
/// sit behind their own locks so a peer forward or a liveness probe
/// can be written while the owning task is parked in [`recv`].
///
/// [`recv`]: Connection::recv
pub struct WebSocketConnection {
    id: ConnectionId,
    sink: Arc<Mutex<SplitSink<WsStream, Message>>>,
    stream: Arc<Mutex<SplitStream<WsStream>>>,
    open: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    closed: Arc<Notify>,
}

impl Clone for WebSocketConnection {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: Arc::clone(&self.sink),
            stream: Arc::clone(&self.stream),
            open: Arc::clone(&self.open),
            alive: Arc::clone(&self.alive),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        if !self.is_open() {
            return Ok(None);
        }
        let mut stream = self.stream.lock().await;
        loop {
            // `close()` may be called by the liveness monitor while this
            // task is parked here; the notification unblocks it so the
            // release path runs even when the peer never sends another
            // byte.
            let msg = tokio::select! {
                _ = self.closed.notified() => None,
                msg = stream.next() => msg,
            };
            match msg {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Pong(_))) => {
                    self.alive.store(true, Ordering::SeqCst);
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::SeqCst);
                    return Ok(None);
                }
                // Inbound pings are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(TransportError::ReceiveFailed(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn probe(&self) -> Result<(), Self::Error> {
        if !self.is_open() {
            return Err(TransportError::ConnectionClosed(self.id.to_string()));
        }
        let msg = Message::Ping(Vec::new().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            self.open.store(false, Ordering::SeqCst);
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn close(&self) -> Result<(), Self::Error> {
        // Idempotent: only the first close does any work.
        if self.open.swap(false, Ordering::SeqCst) {
            // Best-effort close frame, bounded so a wedged peer cannot
            // stall the caller (the liveness sweep calls this).
            let _ = tokio::time::timeout(CLOSE_GRACE, async {
                let _ = self.sink.lock().await.send(Message::Close(None)).await;
            })
            .await;
            self.closed.notify_one();
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn clear_alive(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
