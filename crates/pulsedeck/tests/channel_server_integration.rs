//! Channel behavior against a real in-process WebSocket server:
//! handshake, typed dispatch, clean vs. unclean closes, reconnect budget,
//! and heartbeats.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use pulsedeck::prelude::*;

enum ServerCmd {
    /// Push a text frame to the connected client.
    Send(String),
    /// Drop the active connection without a close handshake (unclean).
    Drop,
    /// Stop accepting and drop everything, including the listener.
    Shutdown,
}

struct TestServer {
    url: String,
    inbound: mpsc::UnboundedReceiver<String>,
    cmds: mpsc::UnboundedSender<ServerCmd>,
    connections: Arc<AtomicUsize>,
}

/// One-connection-at-a-time WebSocket server driven by commands.
async fn start_server() -> TestServer {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ServerCmd>();
    let connections = Arc::new(AtomicUsize::new(0));
    let conn_count = connections.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(_) => return,
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(ServerCmd::Shutdown) | None => return,
                    // Commands with no client connected are dropped.
                    _ => continue,
                },
            };
            let transport = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(_) => continue,
            };
            conn_count.fetch_add(1, Ordering::SeqCst);
            let (mut sink, mut read) = transport.split();
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ServerCmd::Send(text)) => {
                            let _ = sink.send(Message::Text(text)).await;
                        }
                        Some(ServerCmd::Drop) => break,
                        Some(ServerCmd::Shutdown) | None => return,
                    },
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            let _ = inbound_tx.send(text);
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    },
                }
            }
            // The split halves drop here; without a prior close handshake the
            // client observes an abrupt, unclean termination.
        }
    });

    TestServer {
        url,
        inbound,
        cmds: cmd_tx,
        connections,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();
}

fn test_config(server: &TestServer) -> ChannelConfig {
    ChannelConfig::new(format!("{}/ws/dashboard/", server.url))
        .with_heartbeat_interval(Duration::from_secs(60))
        .with_initial_backoff(Duration::from_millis(30))
        .with_max_backoff(Duration::from_millis(120))
}

async fn recv_text(rx: &mut mpsc::UnboundedReceiver<String>) -> String {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("server task ended")
}

async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_connect_sends_handshake_and_dispatches_typed_events() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));

    let (update_tx, mut update_rx) = mpsc::unbounded_channel();
    channel.on("metrics_update", move |msg| {
        let _ = update_tx.send(msg.clone());
    });
    let any_count = Arc::new(AtomicUsize::new(0));
    let counter = any_count.clone();
    channel.on("message", move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    channel.connect().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Open);

    assert_eq!(
        recv_text(&mut server.inbound).await,
        r#"{"type":"subscribe_all"}"#
    );

    server
        .cmds
        .send(ServerCmd::Send(
            r#"{"type":"metrics_update","hostname":"web-01","metrics":{"cpu_percent":12.5,"memory_percent":34.0,"memory_available_mb":2048.0,"memory_used_mb":2048.0},"timestamp":1700.0}"#
                .to_string(),
        ))
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), update_rx.recv())
        .await
        .unwrap()
        .unwrap();
    match msg {
        ServerMessage::MetricsUpdate {
            hostname, metrics, ..
        } => {
            assert_eq!(hostname, "web-01");
            assert!((metrics.cpu_percent - 12.5).abs() < f64::EPSILON);
        }
        other => panic!("expected MetricsUpdate, got {other:?}"),
    }
    assert!(any_count.load(Ordering::SeqCst) >= 1);

    channel.disconnect();
}

#[tokio::test]
async fn test_connect_is_idempotent_while_open() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));

    channel.connect().await.unwrap();
    channel.connect().await.unwrap();
    channel.connect().await.unwrap();

    let _ = recv_text(&mut server.inbound).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);

    channel.disconnect();
}

#[tokio::test]
async fn test_clean_disconnect_suppresses_reconnect() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));

    channel.connect().await.unwrap();
    let _ = recv_text(&mut server.inbound).await;

    channel.disconnect();
    assert!(wait_until(|| channel.state() == ChannelState::Closed).await);

    // Well past several backoff periods: still exactly one connection ever.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections.load(Ordering::SeqCst), 1);
    assert_eq!(channel.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_unclean_close_reconnects_and_resubscribes() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));

    channel.connect().await.unwrap();
    assert_eq!(
        recv_text(&mut server.inbound).await,
        r#"{"type":"subscribe_all"}"#
    );

    server.cmds.send(ServerCmd::Drop).unwrap();

    // The channel re-dials after the backoff delay and re-subscribes.
    assert_eq!(
        recv_text(&mut server.inbound).await,
        r#"{"type":"subscribe_all"}"#
    );
    assert!(wait_until(|| server.connections.load(Ordering::SeqCst) == 2).await);
    assert!(wait_until(|| channel.state() == ChannelState::Open).await);
    // A successful open resets the attempt counter.
    assert_eq!(channel.reconnect_attempts(), 0);

    channel.disconnect();
}

#[tokio::test]
async fn test_reconnect_budget_is_bounded() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server).with_max_reconnect_attempts(2));

    channel.connect().await.unwrap();
    let _ = recv_text(&mut server.inbound).await;

    // Kill the server outright: the live transport drops uncleanly and every
    // re-dial is refused.
    server.cmds.send(ServerCmd::Shutdown).unwrap();

    assert!(wait_until(|| channel.reconnect_attempts() == 2).await);
    tokio::time::sleep(Duration::from_millis(400)).await;
    // No third attempt was scheduled.
    assert_eq!(channel.reconnect_attempts(), 2);
    assert_eq!(channel.state(), ChannelState::Closed);

    // Automatic recovery stopped, but a manual connect is still allowed.
    assert!(channel.connect().await.is_err());
}

#[tokio::test]
async fn test_heartbeat_pings_flow_while_open() {
    let mut server = start_server().await;
    let channel = Channel::new(
        test_config(&server).with_heartbeat_interval(Duration::from_millis(100)),
    );

    channel.connect().await.unwrap();
    let _ = recv_text(&mut server.inbound).await; // handshake

    let ping = recv_text(&mut server.inbound).await;
    let value: serde_json::Value = serde_json::from_str(&ping).unwrap();
    assert_eq!(value["type"], "ping");
    assert!(value["timestamp"].is_u64());

    channel.disconnect();
}

#[tokio::test]
async fn test_updates_stream_yields_messages() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));
    let mut updates = Box::pin(channel.updates());

    channel.connect().await.unwrap();
    let _ = recv_text(&mut server.inbound).await; // handshake

    server
        .cmds
        .send(ServerCmd::Send(
            r#"{"type":"host_offline","hostname":"db-01"}"#.to_string(),
        ))
        .unwrap();

    let msg = tokio::time::timeout(Duration::from_secs(2), updates.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg.event_name(), "host_offline");

    channel.disconnect();
}

#[tokio::test]
async fn test_send_transmits_only_while_open() {
    let mut server = start_server().await;
    let channel = Channel::new(test_config(&server));

    // Not open yet: dropped with a warning, never queued.
    channel.send(&ClientMessage::Ping { timestamp: 1 });

    channel.connect().await.unwrap();
    let _ = recv_text(&mut server.inbound).await; // handshake

    channel.send(&ClientMessage::Ping { timestamp: 2 });
    let sent = recv_text(&mut server.inbound).await;
    assert_eq!(sent, r#"{"type":"ping","timestamp":2}"#);

    channel.disconnect();
    assert!(wait_until(|| channel.state() == ChannelState::Closed).await);

    // Closed again: nothing reaches the server.
    channel.send(&ClientMessage::Ping { timestamp: 3 });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(server.inbound.try_recv().is_err());
}
