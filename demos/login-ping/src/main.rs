//! Login and ping demo.
//!
//! Starts a server on a loopback port, connects one client, logs in,
//! waits for the room assignment, then measures a few ping round trips.
//! The round trip is timed on the first response; the next ping goes out
//! once the server's followup response has arrived too.
//!
//! ```text
//! RUST_LOG=debug cargo run -p login-ping
//! ```

use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use keelnet::prelude::*;
use keelnet::protocol::ERROR_NONE;

const PINGS: usize = 5;
const DEADLINE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), KeelnetError> {
    init_tracing(LogConfig::default())?;

    let server_config = ServerConfig {
        host: Ipv4Addr::LOCALHOST.into(),
        port: 0,
        ..ServerConfig::default()
    };
    let replies_per_ping = if server_config.ping_followup_len > 0 { 2 } else { 1 };
    let server = KeelnetServer::builder().config(server_config).build()?;
    let port = server.local_addr()?.port();
    let handle = server.handle();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    let config = ClientConfig {
        port,
        ..ClientConfig::default()
    };
    let (peer, mut events) = ClientPeer::new(config.link_settings(), CipherKey::embedded());
    peer.connect(&config.host, config.port)?;
    match events.recv().await {
        Some(PeerEvent::Connected) => {}
        other => {
            tracing::error!(?other, "could not connect");
            return Ok(());
        }
    }

    peer.enqueue_message(&Message::Login(LoginRequest { id: "demo".into() }))?;

    let mut rtts = Vec::with_capacity(PINGS);
    let run = tokio::time::timeout(DEADLINE, async {
        let mut ticker = tokio::time::interval(Duration::from_millis(1));
        let mut ping_sent: Option<Instant> = None;
        let mut replies = 0;

        while rtts.len() < PINGS {
            ticker.tick().await;
            peer.pump(|frame| match Message::from_frame(&frame) {
                Ok(Message::LoginResponse(reply)) if reply.error == ERROR_NONE => {
                    peer.set_session(reply.session);
                    tracing::info!(session = %reply.session, "logged in");
                }
                Ok(Message::LoginResponse(reply)) => {
                    tracing::warn!(error = reply.error, "login rejected");
                }
                Ok(Message::EnterRoom(notice)) => {
                    tracing::info!(room = %notice.room_number, "entered room");
                    ping_sent = send_ping(&peer);
                }
                Ok(Message::PingResponse(reply)) => {
                    replies += 1;
                    if let Some(sent) = ping_sent.take() {
                        let rtt = sent.elapsed();
                        tracing::info!(rtt_us = rtt.as_micros() as u64, bytes = reply.text.len(), "pong");
                        rtts.push(rtt);
                    }
                    if replies == replies_per_ping {
                        replies = 0;
                        if rtts.len() < PINGS {
                            ping_sent = send_ping(&peer);
                        }
                    }
                }
                Ok(other) => tracing::debug!(message_id = other.id().as_u16(), "unexpected message"),
                Err(e) => tracing::warn!(error = %e, "undecodable frame"),
            });
        }
    })
    .await;

    if run.is_err() {
        tracing::error!(received = rtts.len(), "timed out waiting for pongs");
    } else {
        let total: Duration = rtts.iter().sum();
        tracing::info!(
            pings = rtts.len(),
            avg_rtt_us = (total / rtts.len() as u32).as_micros() as u64,
            sessions = handle.session_count(),
            rooms = handle.matchmaker().room_count(),
            "done"
        );
    }

    if peer.disconnect() {
        let _ = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
    }
    handle.shutdown();
    if let Err(e) = server_task.await {
        tracing::error!(error = %e, "server task failed");
    }
    Ok(())
}

fn send_ping(peer: &ClientPeer) -> Option<Instant> {
    match peer.enqueue_message(&Message::Ping(PingRequest {})) {
        Ok(()) => Some(Instant::now()),
        Err(e) => {
            tracing::error!(error = %e, "ping encode failed");
            None
        }
    }
}
