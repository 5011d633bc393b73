//! Integration tests for the Rollcall server, handler, and full connection flow.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use rollcall::prelude::*;
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

const SECRET: &[u8] = b"integration-secret";

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// A running server on a random port, with tokens for T1, S1 and S2.
struct TestServer {
    addr: String,
    hub: HubHandle,
    issuer: JwtAuthenticator<MemoryDirectory>,
    store: MemoryAttendanceStore,
}

impl TestServer {
    fn token(&self, identity: &Identity) -> String {
        self.issuer
            .issue_token(identity, chrono::Duration::hours(1))
            .expect("token should issue")
    }

    fn url(&self, token: &str) -> String {
        format!("ws://{}/?token={token}", self.addr)
    }

    async fn connect_as(&self, identity: &Identity) -> ClientWs {
        let url = self.url(&self.token(identity));
        let (ws, _) = tokio_tungstenite::connect_async(url)
            .await
            .expect("should connect");
        ws
    }

    /// Connects and waits until the hub has registered the connection, so
    /// the client is guaranteed to see later broadcasts.
    async fn join(&self, identity: &Identity) -> ClientWs {
        let before = self.hub.connection_count().await.unwrap();
        let ws = self.connect_as(identity).await;
        self.wait_for_connections(before + 1).await;
        ws
    }

    async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..200 {
            if self.hub.connection_count().await.unwrap() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("hub never reached {expected} connections");
    }
}

async fn start_server(idle_timeout: Option<Duration>) -> TestServer {
    start_with(RollcallServerBuilder::new().idle_timeout(idle_timeout)).await
}

async fn start_with(builder: RollcallServerBuilder) -> TestServer {
    let directory = MemoryDirectory::new();
    directory.insert(Identity::teacher("T1")).await;
    directory.insert(Identity::student("S1")).await;
    directory.insert(Identity::student("S2")).await;

    let roster = MemoryRoster::new();
    roster
        .insert_class(
            ClassId::new("C1"),
            [ParticipantId::new("S1"), ParticipantId::new("S2")],
        )
        .await;
    let store = MemoryAttendanceStore::new();

    let server = builder
        .bind("127.0.0.1:0")
        .build(
            JwtAuthenticator::new(SECRET, directory.clone()),
            roster,
            store.clone(),
        )
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let hub = server.hub();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    TestServer {
        addr,
        hub,
        issuer: JwtAuthenticator::new(SECRET, directory),
        store,
    }
}

async fn send_json(ws: &mut ClientWs, value: Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("send should succeed");
}

/// Next data frame as raw JSON, skipping control frames.
async fn recv_json(ws: &mut ClientWs) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("frame error");
        if msg.is_text() || msg.is_binary() {
            return serde_json::from_slice(&msg.into_data()).expect("valid json");
        }
    }
}

async fn recv_event(ws: &mut ClientWs) -> OutboundEvent {
    serde_json::from_value(recv_json(ws).await).expect("known outbound event")
}

/// Asserts nothing arrives for a short while.
async fn assert_silent(ws: &mut ClientWs) {
    let next = tokio::time::timeout(Duration::from_millis(100), ws.next()).await;
    assert!(next.is_err(), "expected no frame, got {next:?}");
}

/// Asserts the server closes the socket.
async fn assert_closed(ws: &mut ClientWs) {
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("server should close the connection");
    assert!(
        matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))),
        "expected close, got {next:?}"
    );
}

fn mark(student: &str, status: &str) -> Value {
    json!({"event": "ATTENDANCE_MARKED", "data": {"studentId": student, "status": status}})
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_connect_without_token_is_rejected() {
    let server = start_server(None).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/", server.addr))
        .await
        .expect("upgrade still succeeds");

    assert_eq!(
        recv_json(&mut ws).await,
        json!({"event": "ERROR", "data": {"message": "Unauthorized or invalid token"}})
    );
    assert_closed(&mut ws).await;
    assert_eq!(server.hub.connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_connect_with_invalid_token_is_rejected() {
    let server = start_server(None).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(server.url("not-a-jwt"))
        .await
        .unwrap();

    assert_eq!(
        recv_event(&mut ws).await,
        OutboundEvent::error(UNAUTHORIZED_MESSAGE)
    );
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_connect_with_token_for_deleted_user_is_rejected() {
    let server = start_server(None).await;
    let token = server.token(&Identity::student("S2"));
    server
        .issuer
        .directory()
        .remove(&ParticipantId::new("S2"))
        .await;

    let (mut ws, _) = tokio_tungstenite::connect_async(server.url(&token))
        .await
        .unwrap();

    assert_eq!(
        recv_event(&mut ws).await,
        OutboundEvent::error(UNAUTHORIZED_MESSAGE)
    );
    assert_closed(&mut ws).await;
}

#[tokio::test]
async fn test_valid_token_registers_and_disconnect_unregisters() {
    let server = start_server(None).await;

    let mut ws = server.join(&Identity::student("S1")).await;
    assert_eq!(server.hub.connection_count().await.unwrap(), 1);

    ws.close(None).await.unwrap();
    server.wait_for_connections(0).await;
}

// =========================================================================
// Events over the wire
// =========================================================================

#[tokio::test]
async fn test_mark_reaches_every_client_in_order() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;
    let mut student = server.join(&Identity::student("S1")).await;

    send_json(&mut teacher, mark("S1", "present")).await;

    for ws in [&mut teacher, &mut student] {
        assert_eq!(
            recv_json(ws).await,
            json!({"event": "ATTENDANCE_MARKED", "data": {"studentId": "S1", "status": "present"}})
        );
        assert_eq!(
            recv_json(ws).await,
            json!({"event": "TODAY_SUMMARY", "data": {"present": 1, "absent": 0, "total": 1}})
        );
    }
}

#[tokio::test]
async fn test_my_attendance_round_trip() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut student = server.join(&Identity::student("S2")).await;

    send_json(&mut student, json!({"event": "MY_ATTENDANCE"})).await;

    assert_eq!(
        recv_json(&mut student).await,
        json!({"event": "MY_ATTENDANCE", "data": {"status": "not yet updated"}})
    );
}

#[tokio::test]
async fn test_forbidden_event_keeps_connection_open() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut student = server.join(&Identity::student("S1")).await;

    send_json(&mut student, json!({"event": "DONE", "data": null})).await;
    assert_eq!(
        recv_event(&mut student).await,
        OutboundEvent::error("Forbidden, teacher event only")
    );

    // Still connected and served.
    send_json(&mut student, json!({"event": "MY_ATTENDANCE"})).await;
    assert_eq!(
        recv_event(&mut student).await,
        OutboundEvent::MyAttendance {
            status: MyStatus::NotYetMarked
        }
    );
    assert!(server.hub.session_info().await.unwrap().is_some());
}

#[tokio::test]
async fn test_no_session_error_over_the_wire() {
    let server = start_server(None).await;
    let mut teacher = server.join(&Identity::teacher("T1")).await;

    send_json(&mut teacher, json!({"event": "TODAY_SUMMARY"})).await;

    assert_eq!(
        recv_json(&mut teacher).await,
        json!({"event": "ERROR", "data": {"message": "No active attendance session"}})
    );
}

#[tokio::test]
async fn test_student_mark_is_forbidden_whatever_the_payload() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut student = server.join(&Identity::student("S1")).await;

    for frame in [
        json!({"event": "ATTENDANCE_MARKED"}),
        json!({"event": "ATTENDANCE_MARKED", "data": null}),
        json!({"event": "ATTENDANCE_MARKED", "data": {"studentId": 42, "status": "present"}}),
        mark("S1", "present"),
    ] {
        send_json(&mut student, frame).await;
        assert_eq!(
            recv_event(&mut student).await,
            OutboundEvent::error("Forbidden, teacher event only")
        );
    }
    assert!(server.store.records().await.is_empty());
}

#[tokio::test]
async fn test_malformed_mark_without_session_reports_no_session() {
    let server = start_server(None).await;
    let mut teacher = server.join(&Identity::teacher("T1")).await;

    for frame in [
        json!({"event": "ATTENDANCE_MARKED"}),
        json!({"event": "ATTENDANCE_MARKED", "data": {"studentId": "S1", "status": "late"}}),
    ] {
        send_json(&mut teacher, frame).await;
        assert_eq!(
            recv_json(&mut teacher).await,
            json!({"event": "ERROR", "data": {"message": "No active attendance session"}})
        );
    }
}

#[tokio::test]
async fn test_mistyped_mark_during_session_is_a_silent_no_op() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;
    let mut student = server.join(&Identity::student("S1")).await;

    send_json(
        &mut teacher,
        json!({"event": "ATTENDANCE_MARKED", "data": {"studentId": 42, "status": true}}),
    )
    .await;
    send_json(&mut teacher, json!({"event": "ATTENDANCE_MARKED", "data": "S1"})).await;
    assert_silent(&mut teacher).await;
    assert_silent(&mut student).await;

    send_json(&mut teacher, json!({"event": "TODAY_SUMMARY"})).await;
    assert_eq!(
        recv_event(&mut teacher).await,
        OutboundEvent::TodaySummary(Summary::default())
    );
}

#[tokio::test]
async fn test_done_with_empty_data_finalizes() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;

    send_json(&mut teacher, json!({"event": "DONE", "data": {}})).await;

    assert_eq!(
        recv_json(&mut teacher).await,
        json!({
            "event": "DONE",
            "data": {"message": "Attendance persisted", "present": 0, "absent": 2, "total": 2}
        })
    );
    assert_eq!(server.hub.session_info().await.unwrap(), None);
    assert_eq!(server.store.for_class(&ClassId::new("C1")).await.len(), 2);
}

#[tokio::test]
async fn test_payloadless_requests_ignore_data() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;
    let mut student = server.join(&Identity::student("S1")).await;

    send_json(&mut teacher, json!({"event": "TODAY_SUMMARY", "data": {}})).await;
    assert!(matches!(
        recv_event(&mut teacher).await,
        OutboundEvent::TodaySummary(_)
    ));
    recv_event(&mut student).await;

    send_json(&mut student, json!({"event": "MY_ATTENDANCE", "data": {"x": 1}})).await;
    assert_eq!(
        recv_event(&mut student).await,
        OutboundEvent::MyAttendance {
            status: MyStatus::NotYetMarked
        }
    );
}

#[tokio::test]
async fn test_garbage_and_unknown_events_are_dropped() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut student = server.join(&Identity::student("S1")).await;

    student
        .send(Message::text("definitely not json".to_string()))
        .await
        .unwrap();
    send_json(&mut student, json!({"event": "RAISE_HAND"})).await;
    assert_silent(&mut student).await;

    send_json(&mut student, json!({"event": "MY_ATTENDANCE"})).await;
    assert!(matches!(
        recv_event(&mut student).await,
        OutboundEvent::MyAttendance { .. }
    ));
}

#[tokio::test]
async fn test_binary_frames_are_accepted() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;

    let bytes = serde_json::to_vec(&mark("S2", "absent")).unwrap();
    teacher.send(Message::Binary(bytes.into())).await.unwrap();

    assert_eq!(
        recv_event(&mut teacher).await,
        OutboundEvent::AttendanceMarked {
            student_id: ParticipantId::new("S2"),
            status: AttendanceStatus::Absent,
        }
    );
}

#[tokio::test]
async fn test_finalize_persists_and_broadcasts_done() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;
    let mut s1 = server.join(&Identity::student("S1")).await;
    let mut s2 = server.join(&Identity::student("S2")).await;

    send_json(&mut teacher, mark("S1", "present")).await;
    for ws in [&mut teacher, &mut s1, &mut s2] {
        recv_event(ws).await;
        recv_event(ws).await;
    }

    send_json(&mut teacher, json!({"event": "DONE"})).await;

    let done = json!({
        "event": "DONE",
        "data": {"message": "Attendance persisted", "present": 1, "absent": 1, "total": 2}
    });
    for ws in [&mut teacher, &mut s1, &mut s2] {
        assert_eq!(recv_json(ws).await, done);
    }

    let class = ClassId::new("C1");
    assert_eq!(server.store.for_class(&class).await.len(), 2);
    assert_eq!(
        server
            .store
            .status_of(&class, &ParticipantId::new("S2"))
            .await,
        Some(AttendanceStatus::Absent)
    );
    assert_eq!(server.hub.session_info().await.unwrap(), None);

    // Later events see no session.
    send_json(&mut s1, json!({"event": "MY_ATTENDANCE"})).await;
    assert_eq!(
        recv_event(&mut s1).await,
        OutboundEvent::error("No active attendance session")
    );
}

#[tokio::test]
async fn test_one_client_leaving_does_not_affect_others() {
    let server = start_server(None).await;
    server.hub.start_session(ClassId::new("C1")).await.unwrap();
    let mut teacher = server.join(&Identity::teacher("T1")).await;
    let mut s1 = server.join(&Identity::student("S1")).await;

    s1.close(None).await.unwrap();
    server.wait_for_connections(1).await;

    send_json(&mut teacher, json!({"event": "TODAY_SUMMARY"})).await;
    assert_eq!(
        recv_event(&mut teacher).await,
        OutboundEvent::TodaySummary(Summary::default())
    );
}

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_other_clients() {
    let server = start_server(None).await;
    let _silent = tokio::net::TcpStream::connect(&server.addr).await.unwrap();

    let mut teacher = tokio::time::timeout(
        Duration::from_secs(2),
        server.join(&Identity::teacher("T1")),
    )
    .await
    .expect("a stalled handshake should not hold up the listener");

    send_json(&mut teacher, json!({"event": "TODAY_SUMMARY"})).await;
    assert_eq!(
        recv_event(&mut teacher).await,
        OutboundEvent::error("No active attendance session")
    );
}

#[tokio::test]
async fn test_unfinished_handshake_is_dropped() {
    let server =
        start_with(RollcallServerBuilder::new().handshake_timeout(Duration::from_millis(100)))
            .await;
    let mut silent = tokio::net::TcpStream::connect(&server.addr).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("server should drop the peer");
    assert!(matches!(read, Ok(0) | Err(_)), "expected EOF, got {read:?}");
    assert_eq!(server.hub.connection_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let server = start_server(Some(Duration::from_millis(150))).await;
    let mut student = server.join(&Identity::student("S1")).await;

    assert_closed(&mut student).await;
    server.wait_for_connections(0).await;
}
