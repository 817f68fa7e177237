//! Integration tests for the Keelnet server: login, ping, rooms and
//! connection teardown, over real loopback sockets.

use std::time::Duration;

use keelnet::prelude::*;
use keelnet::protocol::FrameCodec;
use keelnet::transport::{Assembled, FrameAssembler, LinkSettings};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

// =========================================================================
// Helpers
// =========================================================================

fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".parse().unwrap(),
        port: 0,
        ..ServerConfig::default()
    }
}

/// Starts a server on a random port and returns its port and a handle.
async fn start_server(config: ServerConfig) -> (u16, ServerHandle) {
    let server = KeelnetServer::builder()
        .config(config)
        .build()
        .expect("server should build");
    let port = server.local_addr().expect("should have local addr").port();
    let handle = server.handle();

    tokio::spawn(async move {
        let _ = server.run().await;
    });
    (port, handle)
}

async fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            if let Some(v) = f() {
                return v;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold in time")
}

async fn connect(port: u16) -> (ClientPeer, mpsc::UnboundedReceiver<PeerEvent>) {
    let (peer, mut events) = ClientPeer::new(
        LinkSettings {
            recv_buffer_size: 4096,
            max_frame_size: 8192,
        },
        CipherKey::embedded(),
    );
    peer.connect("127.0.0.1", port).unwrap();
    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(event, Some(PeerEvent::Connected));
    (peer, events)
}

fn send(peer: &ClientPeer, message: Message) {
    peer.enqueue_message(&message).unwrap();
    while peer.send_out() {}
}

async fn recv(peer: &ClientPeer) -> Message {
    let frame = wait_for(|| peer.dispatch()).await;
    Message::from_frame(&frame).expect("server sent a catalog message")
}

fn login(name: &str) -> Message {
    Message::Login(LoginRequest { id: name.into() })
}

/// Reads one intact frame off a raw socket.
async fn read_frame(stream: &mut TcpStream, assembler: &mut FrameAssembler) -> Frame {
    let codec = FrameCodec::default();
    tokio::time::timeout(WAIT, async {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(Assembled::Frame(frame)) = assembler.next_frame(&codec).unwrap() {
                return frame;
            }
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "server closed the socket");
            assembler.extend(&chunk[..n]);
        }
    })
    .await
    .expect("frame should arrive")
}

// =========================================================================
// Login
// =========================================================================

#[tokio::test]
async fn test_login_issues_increasing_sessions() {
    let (port, handle) = start_server(test_config()).await;
    let (alice, _a) = connect(port).await;
    let (bob, _b) = connect(port).await;

    send(&alice, login("alice"));
    assert_eq!(
        recv(&alice).await,
        Message::LoginResponse(LoginResponse {
            session: SessionId(1),
            error: 0,
        })
    );

    send(&bob, login("bob"));
    assert_eq!(
        recv(&bob).await,
        Message::LoginResponse(LoginResponse {
            session: SessionId(2),
            error: 0,
        })
    );
    assert_eq!(handle.session_count(), 2);
}

#[tokio::test]
async fn test_login_is_followed_by_enter_room() {
    let (port, handle) = start_server(test_config()).await;
    let (alice, _events) = connect(port).await;

    send(&alice, login("alice"));
    let first = recv(&alice).await;
    let second = recv(&alice).await;

    assert_eq!(first.id(), MessageId::LoginResponse);
    assert_eq!(
        second,
        Message::EnterRoom(EnterRoom {
            room_number: RoomNumber(1),
        })
    );
    assert_eq!(handle.matchmaker().user_count(), 1);
}

#[tokio::test]
async fn test_repeat_login_returns_error_and_existing_session() {
    let (port, handle) = start_server(test_config()).await;
    let (alice, _events) = connect(port).await;

    send(&alice, login("alice"));
    recv(&alice).await;
    recv(&alice).await;

    send(&alice, login("alice"));
    assert_eq!(
        recv(&alice).await,
        Message::LoginResponse(LoginResponse {
            session: SessionId(1),
            error: 1,
        })
    );
    assert_eq!(handle.matchmaker().user_count(), 1);
    assert_eq!(handle.session_count(), 1);
}

#[tokio::test]
async fn test_small_rooms_spill_into_new_room() {
    let config = ServerConfig {
        rooms: RoomConfig { capacity: 1 },
        ..test_config()
    };
    let (port, handle) = start_server(config).await;
    let (alice, _a) = connect(port).await;
    let (bob, _b) = connect(port).await;

    send(&alice, login("alice"));
    recv(&alice).await;
    assert_eq!(
        recv(&alice).await,
        Message::EnterRoom(EnterRoom {
            room_number: RoomNumber(1)
        })
    );

    send(&bob, login("bob"));
    recv(&bob).await;
    assert_eq!(
        recv(&bob).await,
        Message::EnterRoom(EnterRoom {
            room_number: RoomNumber(2)
        })
    );
    assert_eq!(handle.matchmaker().room_count(), 2);
}

// =========================================================================
// Ping
// =========================================================================

#[tokio::test]
async fn test_ping_reply_has_fixed_size_text_then_followup() {
    let (port, _handle) = start_server(test_config()).await;
    let (peer, _events) = connect(port).await;

    send(&peer, Message::Ping(PingRequest {}));
    let frame = wait_for(|| peer.dispatch()).await;

    assert_eq!(frame.message_id(), MessageId::Ping.as_u16() + 1);
    match Message::from_frame(&frame).unwrap() {
        Message::PingResponse(reply) => {
            assert_eq!(reply.error, 0);
            assert_eq!(reply.text.len(), 2000);
            assert!(reply.text.bytes().all(|b| b == b'1'));
        }
        other => panic!("expected PingResponse, got {other:?}"),
    }

    match recv(&peer).await {
        Message::PingResponse(reply) => {
            assert_eq!(reply.error, 0);
            assert_eq!(reply.text, "2".repeat(200));
        }
        other => panic!("expected PingResponse, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_followup_can_be_disabled() {
    let config = ServerConfig {
        ping_followup_len: 0,
        ..test_config()
    };
    let (port, _handle) = start_server(config).await;
    let (peer, _events) = connect(port).await;

    send(&peer, Message::Ping(PingRequest {}));
    send(&peer, Message::Ping(PingRequest {}));
    let first = wait_for(|| peer.dispatch()).await;
    let second = wait_for(|| peer.dispatch()).await;

    // Both replies carry the long text: no followup in between.
    for frame in [first, second] {
        match Message::from_frame(&frame).unwrap() {
            Message::PingResponse(reply) => assert_eq!(reply.text.len(), 2000),
            other => panic!("expected PingResponse, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_corrupted_ping_is_dropped_and_connection_stays_up() {
    let (port, handle) = start_server(test_config()).await;
    let codec = FrameCodec::default();
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    let mut bad = codec.encode(3, 0, "{}").unwrap();
    bad[12] ^= 0x01;
    stream.write_all(&bad).await.unwrap();
    stream.write_all(&codec.encode(3, 1, "{}").unwrap()).await.unwrap();

    let mut assembler = FrameAssembler::new(8192);
    let reply = read_frame(&mut stream, &mut assembler).await;
    let followup = read_frame(&mut stream, &mut assembler).await;
    assert_eq!(reply.message_id(), 4);
    assert_eq!(followup.message_id(), 4);
    // Only the intact ping was answered: one reply and its followup.
    assert_eq!(reply.sequence(), 0);
    assert_eq!(followup.sequence(), 1);
    assert_eq!(handle.connection_count(), 1);

    stream.write_all(&codec.encode(3, 2, "{}").unwrap()).await.unwrap();
    let again = read_frame(&mut stream, &mut assembler).await;
    assert_eq!(again.sequence(), 2);
}

#[tokio::test]
async fn test_unknown_message_id_is_ignored() {
    let (port, _handle) = start_server(test_config()).await;
    let (peer, _events) = connect(port).await;

    peer.enqueue(42, "{}");
    send(&peer, Message::Ping(PingRequest {}));

    assert_eq!(recv(&peer).await.id(), MessageId::PingResponse);
}

// =========================================================================
// Teardown and pooling
// =========================================================================

#[tokio::test]
async fn test_disconnect_releases_session_room_and_slot() {
    let (port, handle) = start_server(test_config()).await;
    let (alice, mut events) = connect(port).await;

    send(&alice, login("alice"));
    recv(&alice).await;
    recv(&alice).await;
    assert_eq!(handle.pool_in_use(), 1);

    assert!(alice.disconnect());
    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(event, Some(PeerEvent::Disconnected));

    wait_for(|| (handle.connection_count() == 0).then_some(())).await;
    assert_eq!(handle.session_count(), 0);
    assert_eq!(handle.pool_in_use(), 0);
    assert_eq!(handle.matchmaker().user_count(), 0);
    // Emptied rooms are kept.
    assert_eq!(handle.matchmaker().room_count(), 1);
}

#[tokio::test]
async fn test_pool_exhaustion_closes_extra_socket() {
    let config = ServerConfig {
        max_connections: 1,
        ..test_config()
    };
    let (port, handle) = start_server(config).await;
    let (first, _events) = connect(port).await;
    wait_for(|| (handle.connection_count() == 1).then_some(())).await;

    let mut extra = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(WAIT, extra.read(&mut buf))
        .await
        .unwrap()
        .unwrap_or(0);
    assert_eq!(n, 0);

    send(&first, Message::Ping(PingRequest {}));
    assert_eq!(recv(&first).await.id(), MessageId::PingResponse);
    assert_eq!(handle.pool_in_use(), 1);
}

#[tokio::test]
async fn test_freed_slot_is_reused() {
    let config = ServerConfig {
        max_connections: 1,
        ..test_config()
    };
    let (port, handle) = start_server(config).await;

    let (first, mut events) = connect(port).await;
    wait_for(|| (handle.pool_in_use() == 1).then_some(())).await;
    first.disconnect();
    tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    wait_for(|| (handle.pool_in_use() == 0).then_some(())).await;

    let (second, _events) = connect(port).await;
    send(&second, login("second"));
    assert_eq!(recv(&second).await.id(), MessageId::LoginResponse);
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_disconnects_clients_and_frees_slots() {
    let server = KeelnetServer::builder()
        .config(test_config())
        .build()
        .unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = server.handle();
    let task = tokio::spawn(server.run());

    let (alice, mut alice_events) = connect(port).await;
    let (_bob, mut bob_events) = connect(port).await;
    send(&alice, login("alice"));
    recv(&alice).await;
    recv(&alice).await;
    wait_for(|| (handle.connection_count() == 2).then_some(())).await;

    handle.shutdown();

    for events in [&mut alice_events, &mut bob_events] {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
        assert_eq!(event, Some(PeerEvent::Disconnected));
    }
    let result = tokio::time::timeout(WAIT, task)
        .await
        .expect("run should return after shutdown")
        .expect("server task should not panic");
    assert!(result.is_ok());

    assert_eq!(handle.connection_count(), 0);
    assert_eq!(handle.pool_in_use(), 0);
    assert_eq!(handle.session_count(), 0);
    assert_eq!(handle.matchmaker().user_count(), 0);
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test]
async fn test_shutdown_before_run_returns_immediately() {
    let server = KeelnetServer::builder()
        .config(test_config())
        .build()
        .unwrap();
    server.handle().shutdown();

    let result = tokio::time::timeout(WAIT, server.run())
        .await
        .expect("run should not wait for clients");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_aborted_server_task_closes_client_sockets() {
    let server = KeelnetServer::builder()
        .config(test_config())
        .build()
        .unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = server.handle();
    let task = tokio::spawn(server.run());

    let (_peer, mut events) = connect(port).await;
    wait_for(|| (handle.connection_count() == 1).then_some(())).await;

    task.abort();
    let _ = task.await;

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(event, Some(PeerEvent::Disconnected));
}
