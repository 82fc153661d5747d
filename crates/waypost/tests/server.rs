//! Integration tests for the relay server: full host/join/signal flows
//! over real WebSocket connections.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;
use waypost::prelude::*;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a relay on a random port and returns the address.
async fn start_server() -> String {
    start_server_with(LivenessConfig::default()).await
}

async fn start_server_with(liveness: LivenessConfig) -> String {
    let server = WaypostServerBuilder::new()
        .bind("127.0.0.1:0")
        .liveness(liveness)
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_frame(frame: &Frame) -> Message {
    let bytes = serde_json::to_vec(frame).expect("encode");
    Message::Binary(bytes.into())
}

async fn send_frame(ws: &mut ClientWs, frame: &Frame) {
    ws.send(encode_frame(frame)).await.expect("send frame");
}

/// Receives the next relay frame, skipping liveness pings/pongs.
async fn recv_frame(ws: &mut ClientWs) -> Frame {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended while awaiting frame")
            .expect("recv failed");
        match msg {
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => panic!("connection closed while awaiting frame"),
            msg => {
                return serde_json::from_slice(&msg.into_data()).expect("decode frame");
            }
        }
    }
}

/// Asserts that no relay frame (pings aside) arrives within `dur`.
async fn assert_silent(ws: &mut ClientWs, dur: Duration) {
    let result = tokio::time::timeout(dur, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    })
    .await;
    assert!(result.is_err(), "expected silence, got {result:?}");
}

/// Waits until the peer observes a forced close.
async fn assert_closed(ws: &mut ClientWs) {
    let observed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    observed.expect("peer should observe forced close");
}

fn sid(s: &str) -> SessionId {
    SessionId::new(s)
}

/// Claims `session` as host and returns the acknowledgment frame.
async fn claim_host(ws: &mut ClientWs, session: &str) -> Frame {
    send_frame(
        ws,
        &Frame::Host {
            session_id: sid(session),
        },
    )
    .await;
    recv_frame(ws).await
}

/// Joins `session` as guest and returns the acknowledgment frame.
async fn join(ws: &mut ClientWs, session: &str) -> Frame {
    send_frame(
        ws,
        &Frame::Join {
            session_id: sid(session),
        },
    )
    .await;
    recv_frame(ws).await
}

// =========================================================================
// Host claims
// =========================================================================

#[tokio::test]
async fn test_host_claim_acknowledged() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = claim_host(&mut ws, "s1").await;
    assert_eq!(
        ack,
        Frame::HostOk {
            session_id: sid("s1")
        }
    );
}

#[tokio::test]
async fn test_host_claim_empty_id_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = claim_host(&mut ws, "").await;
    assert_eq!(
        ack,
        Frame::HostError {
            reason: ErrorReason::InvalidId
        }
    );

    // The rejection never terminates the connection — a valid claim
    // afterwards still succeeds.
    let ack = claim_host(&mut ws, "s1").await;
    assert_eq!(
        ack,
        Frame::HostOk {
            session_id: sid("s1")
        }
    );
}

#[tokio::test]
async fn test_host_claim_missing_session_id_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    // A bare {"type":"host"} — the field is absent, not just empty.
    ws.send(Message::Text(r#"{"type":"host"}"#.into()))
        .await
        .expect("send");
    let ack = recv_frame(&mut ws).await;
    assert_eq!(
        ack,
        Frame::HostError {
            reason: ErrorReason::InvalidId
        }
    );
}

#[tokio::test]
async fn test_host_claim_over_text_frames() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    // Browser clients send text frames; the relay accepts both.
    ws.send(Message::Text(
        r#"{"type":"host","sessionId":"txt"}"#.into(),
    ))
    .await
    .expect("send");
    let ack = recv_frame(&mut ws).await;
    assert_eq!(
        ack,
        Frame::HostOk {
            session_id: sid("txt")
        }
    );
}

#[tokio::test]
async fn test_second_host_claim_evicts_first() {
    let addr = start_server().await;
    let mut first = connect(&addr).await;
    let mut second = connect(&addr).await;

    claim_host(&mut first, "s1").await;
    let ack = claim_host(&mut second, "s1").await;
    assert_eq!(
        ack,
        Frame::HostOk {
            session_id: sid("s1")
        }
    );

    // The displaced host observes a forced close.
    assert_closed(&mut first).await;

    // The id now belongs to the second connection: a guest can join it.
    let mut guest = connect(&addr).await;
    let ack = join(&mut guest, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinOk {
            session_id: sid("s1")
        }
    );
}

#[tokio::test]
async fn test_connection_cannot_switch_sessions() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    claim_host(&mut ws, "s1").await;
    let ack = claim_host(&mut ws, "s2").await;
    assert_eq!(
        ack,
        Frame::HostError {
            reason: ErrorReason::AlreadyBound
        }
    );
}

// =========================================================================
// Joins
// =========================================================================

#[tokio::test]
async fn test_join_flow_notifies_both_sides() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;

    let ack = join(&mut guest, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinOk {
            session_id: sid("s1")
        }
    );

    let notice = recv_frame(&mut host).await;
    assert_eq!(
        notice,
        Frame::GuestJoined {
            session_id: sid("s1")
        }
    );
}

#[tokio::test]
async fn test_join_without_host_rejected() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    let ack = join(&mut ws, "ghost").await;
    assert_eq!(
        ack,
        Frame::JoinError {
            reason: ErrorReason::HostNotFound
        }
    );

    // The failed join left nothing behind: it fails identically again.
    let ack = join(&mut ws, "ghost").await;
    assert_eq!(
        ack,
        Frame::JoinError {
            reason: ErrorReason::HostNotFound
        }
    );
}

#[tokio::test]
async fn test_second_guest_evicts_first() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut first = connect(&addr).await;
    let mut second = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    join(&mut first, "s1").await;
    recv_frame(&mut host).await; // guest-joined for the first guest

    let ack = join(&mut second, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinOk {
            session_id: sid("s1")
        }
    );
    assert_closed(&mut first).await;

    // The host hears about the new guest; the displaced guest's
    // departure notice may interleave with it.
    let mut saw_joined = false;
    for _ in 0..2 {
        match recv_frame(&mut host).await {
            Frame::GuestJoined { session_id } => {
                assert_eq!(session_id, sid("s1"));
                saw_joined = true;
                break;
            }
            Frame::GuestLeft { .. } => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
    assert!(saw_joined, "host never saw the second guest join");
}

#[tokio::test]
async fn test_guest_cannot_claim_host_role() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    join(&mut guest, "s1").await;

    let ack = claim_host(&mut guest, "s1").await;
    assert_eq!(
        ack,
        Frame::HostError {
            reason: ErrorReason::AlreadyBound
        }
    );
}

// =========================================================================
// Signal relay
// =========================================================================

#[tokio::test]
async fn test_signal_relays_payload_verbatim_both_directions() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    join(&mut guest, "s1").await;
    recv_frame(&mut host).await; // guest-joined

    // Guest → host, with a payload the relay has no business parsing.
    let payload = json!({
        "sdp": "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1",
        "candidates": [{"port": 54321, "priority": 2113937151.0}],
        "note": "∆ unicode survives ∆",
        "nothing": null,
    });
    send_frame(
        &mut guest,
        &Frame::Signal {
            session_id: sid("s1"),
            payload: payload.clone(),
        },
    )
    .await;

    let received = recv_frame(&mut host).await;
    assert_eq!(
        received,
        Frame::Signal {
            session_id: sid("s1"),
            payload: payload.clone(),
        }
    );

    // Host → guest.
    let reply = json!({"type": "answer", "sdp": "v=0"});
    send_frame(
        &mut host,
        &Frame::Signal {
            session_id: sid("s1"),
            payload: reply.clone(),
        },
    )
    .await;

    let received = recv_frame(&mut guest).await;
    assert_eq!(
        received,
        Frame::Signal {
            session_id: sid("s1"),
            payload: reply,
        }
    );
}

#[tokio::test]
async fn test_signal_before_guest_joins_is_dropped() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    send_frame(
        &mut host,
        &Frame::Signal {
            session_id: sid("s1"),
            payload: json!({"early": true}),
        },
    )
    .await;

    // No peer: no error frame, no echo, nothing.
    assert_silent(&mut host, Duration::from_millis(200)).await;

    // The session is unharmed — a guest can still join and signal.
    join(&mut guest, "s1").await;
    recv_frame(&mut host).await; // guest-joined
    send_frame(
        &mut host,
        &Frame::Signal {
            session_id: sid("s1"),
            payload: json!({"late": true}),
        },
    )
    .await;
    let received = recv_frame(&mut guest).await;
    assert!(matches!(received, Frame::Signal { .. }));
}

#[tokio::test]
async fn test_signal_with_foreign_session_id_is_dropped() {
    let addr = start_server().await;
    let mut host_a = connect(&addr).await;
    let mut guest_a = connect(&addr).await;
    let mut host_b = connect(&addr).await;

    claim_host(&mut host_a, "a").await;
    join(&mut guest_a, "a").await;
    recv_frame(&mut host_a).await; // guest-joined
    claim_host(&mut host_b, "b").await;

    // guest_a declares session "b", which it does not occupy: the
    // frame must reach nobody and produce no error.
    send_frame(
        &mut guest_a,
        &Frame::Signal {
            session_id: sid("b"),
            payload: json!({"spoofed": true}),
        },
    )
    .await;

    assert_silent(&mut host_b, Duration::from_millis(200)).await;
    assert_silent(&mut guest_a, Duration::from_millis(200)).await;
}

// =========================================================================
// Departures
// =========================================================================

#[tokio::test]
async fn test_host_disconnect_notifies_guest_and_removes_session() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    join(&mut guest, "s1").await;

    host.send(Message::Close(None)).await.expect("close");

    let notice = recv_frame(&mut guest).await;
    assert_eq!(
        notice,
        Frame::HostLeft {
            session_id: sid("s1")
        }
    );
    // Exactly one notification.
    assert_silent(&mut guest, Duration::from_millis(200)).await;

    // The session is gone: a fresh join finds no host.
    let mut late = connect(&addr).await;
    let ack = join(&mut late, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinError {
            reason: ErrorReason::HostNotFound
        }
    );
}

#[tokio::test]
async fn test_guest_disconnect_notifies_host_and_keeps_session() {
    let addr = start_server().await;
    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;

    claim_host(&mut host, "s1").await;
    join(&mut guest, "s1").await;
    recv_frame(&mut host).await; // guest-joined

    guest.send(Message::Close(None)).await.expect("close");

    let notice = recv_frame(&mut host).await;
    assert_eq!(
        notice,
        Frame::GuestLeft {
            session_id: sid("s1")
        }
    );
    assert_silent(&mut host, Duration::from_millis(200)).await;

    // The host still owns the id; the next guest joins normally.
    let mut next = connect(&addr).await;
    let ack = join(&mut next, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinOk {
            session_id: sid("s1")
        }
    );
    let notice = recv_frame(&mut host).await;
    assert_eq!(
        notice,
        Frame::GuestJoined {
            session_id: sid("s1")
        }
    );
}

// =========================================================================
// Malformed and unexpected input
// =========================================================================

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Binary(b"not json".to_vec().into()))
        .await
        .expect("send garbage");
    ws.send(Message::Text(r#"{"type":"teleport"}"#.into()))
        .await
        .expect("send unknown type");
    ws.send(Message::Text(r#"{"sessionId":"untagged"}"#.into()))
        .await
        .expect("send untagged");

    // None of it draws a response…
    assert_silent(&mut ws, Duration::from_millis(200)).await;

    // …and the connection still works.
    let ack = claim_host(&mut ws, "s1").await;
    assert_eq!(
        ack,
        Frame::HostOk {
            session_id: sid("s1")
        }
    );
}

#[tokio::test]
async fn test_server_direction_frames_from_client_are_ignored() {
    let addr = start_server().await;
    let mut ws = connect(&addr).await;

    // Well-formed, but not something a client may say.
    send_frame(
        &mut ws,
        &Frame::HostOk {
            session_id: sid("s1"),
        },
    )
    .await;
    send_frame(
        &mut ws,
        &Frame::GuestJoined {
            session_id: sid("s1"),
        },
    )
    .await;

    assert_silent(&mut ws, Duration::from_millis(200)).await;

    // No session was created by any of that.
    let ack = join(&mut ws, "s1").await;
    assert_eq!(
        ack,
        Frame::JoinError {
            reason: ErrorReason::HostNotFound
        }
    );
}

// =========================================================================
// Liveness
// =========================================================================

#[tokio::test]
async fn test_silent_host_is_reclaimed_without_explicit_close() {
    let addr = start_server_with(LivenessConfig::with_interval(Duration::from_millis(
        100,
    )))
    .await;

    let mut host = connect(&addr).await;
    claim_host(&mut host, "liv").await;

    let mut guest = connect(&addr).await;
    let ack = join(&mut guest, "liv").await;
    assert_eq!(
        ack,
        Frame::JoinOk {
            session_id: sid("liv")
        }
    );

    // Stop polling the host socket but keep it open: pings pile up
    // unanswered in its receive buffer, so two sweeps later the monitor
    // terminates it. The guest keeps polling (and therefore keeps
    // answering pings) and must see the same host-left it would get
    // from an explicit close.
    let _parked_host = host;

    let notice = recv_frame(&mut guest).await;
    assert_eq!(
        notice,
        Frame::HostLeft {
            session_id: sid("liv")
        }
    );

    // The session really was released, not just notified about.
    let mut late = connect(&addr).await;
    let ack = join(&mut late, "liv").await;
    assert_eq!(
        ack,
        Frame::JoinError {
            reason: ErrorReason::HostNotFound
        }
    );
}

#[tokio::test]
async fn test_responsive_connections_survive_sweeps() {
    let addr = start_server_with(LivenessConfig::with_interval(Duration::from_millis(
        100,
    )))
    .await;

    let mut host = connect(&addr).await;
    let mut guest = connect(&addr).await;
    claim_host(&mut host, "liv").await;
    join(&mut guest, "liv").await;
    recv_frame(&mut host).await; // guest-joined

    // Both sides idle across several sweep intervals, but keep polling
    // so the probe answers flow — that is what keeps them alive.
    tokio::join!(
        assert_silent(&mut host, Duration::from_millis(500)),
        assert_silent(&mut guest, Duration::from_millis(500)),
    );

    // Still paired: a signal goes through.
    send_frame(
        &mut host,
        &Frame::Signal {
            session_id: sid("liv"),
            payload: json!({"still": "here"}),
        },
    )
    .await;
    let received = recv_frame(&mut guest).await;
    assert!(matches!(received, Frame::Signal { .. }));
}
