//! Resilient real-time update channel.
//!
//! One [`Channel`] owns at most one live WebSocket transport to a push
//! endpoint. Unclean closes trigger automatic reconnects with bounded
//! exponential backoff; a clean [`Channel::disconnect`] suppresses them.
//! While open, the channel sends a liveness ping on a fixed interval and
//! fans inbound messages out to subscribers by message type.
//!
//! # Example
//! ```rust,ignore
//! use pulsedeck_client::{ws_endpoint, Channel, ChannelConfig};
//!
//! let endpoint = ws_endpoint("https://metrics.example.com", "ws/dashboard/")?;
//! let channel = Channel::new(ChannelConfig::new(endpoint));
//! channel.on("metrics_update", |msg| println!("{msg:?}"));
//! channel.connect().await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Notify};
use tokio::time::{interval_at, Instant};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use pulsedeck_core::error::ChannelError;
use pulsedeck_types::{ClientMessage, ServerMessage};

use crate::backoff::Backoff;
use crate::dispatch::{Dispatcher, HandlerId};

/// Resolve a logical path against an http(s) origin, switching to the
/// matching ws(s) scheme. Already-websocket URLs pass through unchanged.
pub fn ws_endpoint(base: &str, path: &str) -> Result<String, ChannelError> {
    let path = path.trim_start_matches('/');
    if let Some(rest) = base.strip_prefix("https://") {
        Ok(format!("wss://{}/{}", rest.trim_end_matches('/'), path))
    } else if let Some(rest) = base.strip_prefix("http://") {
        Ok(format!("ws://{}/{}", rest.trim_end_matches('/'), path))
    } else if base.starts_with("wss://") || base.starts_with("ws://") {
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    } else {
        Err(ChannelError::InvalidEndpoint(base.to_string()))
    }
}

/// Configuration for an update channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Full ws(s) endpoint URL.
    pub endpoint: String,
    /// Reconnect budget after an unclean close.
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; doubles per attempt.
    pub initial_backoff: Duration,
    /// Reconnect delay cap.
    pub max_backoff: Duration,
    /// Outbound liveness ping interval.
    pub heartbeat_interval: Duration,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_reconnect_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
        }
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}

/// Connection lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

struct ChannelInner {
    config: ChannelConfig,
    state: RwLock<ChannelState>,
    dispatcher: Dispatcher,
    backoff: Mutex<Backoff>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    /// Wakes the transport loop and any pending reconnect timer.
    shutdown: Notify,
    /// Set by `disconnect` to suppress the reconnect path.
    closing: AtomicBool,
}

/// Reconnecting push-message client.
///
/// Constructed and owned explicitly by whichever component consumes it;
/// dropping the channel after [`Channel::disconnect`] releases everything.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Self {
        let backoff = Backoff::new(
            config.initial_backoff,
            config.max_backoff,
            config.max_reconnect_attempts,
        );
        Self {
            inner: Arc::new(ChannelInner {
                config,
                state: RwLock::new(ChannelState::Idle),
                dispatcher: Dispatcher::new(),
                backoff: Mutex::new(backoff),
                outbound: Mutex::new(None),
                shutdown: Notify::new(),
                closing: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.state()
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.backoff.lock().unwrap().attempts()
    }

    /// Register a handler for an event name. Inbound messages fire both
    /// `"message"` and the event named after their wire `type`.
    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner.dispatcher.on(event, handler)
    }

    /// Remove a handler registered with [`Channel::on`].
    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        self.inner.dispatcher.off(event, id)
    }

    /// All messages as a stream, for consumers that prefer iteration over
    /// callbacks. Delivery stops when the stream is dropped.
    pub fn updates(&self) -> impl futures::Stream<Item = ServerMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.on(pulsedeck_types::EVENT_MESSAGE, move |msg| {
            let _ = tx.send(msg.clone());
        });
        async_stream::stream! {
            while let Some(msg) = rx.recv().await {
                yield msg;
            }
        }
    }

    /// Open the transport and send the subscribe handshake.
    ///
    /// A call while the channel is already connecting or open is a no-op
    /// returning `Ok`; at most one live transport exists per channel. Fails
    /// if the transport reports an error before opening, in which case no
    /// automatic retry is scheduled — the caller decides.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        {
            let mut state = self.inner.state.write().unwrap();
            match *state {
                ChannelState::Connecting | ChannelState::Open => {
                    debug!("connect ignored, channel already {:?}", *state);
                    return Ok(());
                }
                _ => *state = ChannelState::Connecting,
            }
        }
        self.inner.closing.store(false, Ordering::SeqCst);
        ChannelInner::open(self.inner.clone()).await
    }

    /// Send a message while the channel is open.
    ///
    /// Anything else is a warn-level no-op: delivery is best-effort and
    /// messages are never queued for later.
    pub fn send(&self, msg: &ClientMessage) {
        self.inner.send(msg);
    }

    /// Intentional close: cancels any pending reconnect timer and the
    /// heartbeat, closes the transport with a normal-closure code, and
    /// suppresses the reconnect path.
    pub fn disconnect(&self) {
        let inner = &self.inner;
        inner.closing.store(true, Ordering::SeqCst);
        {
            let mut state = inner.state.write().unwrap();
            if matches!(*state, ChannelState::Connecting | ChannelState::Open) {
                *state = ChannelState::Closing;
            }
        }
        inner.shutdown.notify_waiters();
        info!(endpoint = %inner.config.endpoint, "channel disconnect requested");
    }
}

impl ChannelInner {
    fn state(&self) -> ChannelState {
        *self.state.read().unwrap()
    }

    fn send(&self, msg: &ClientMessage) {
        if self.state() != ChannelState::Open {
            warn!(endpoint = %self.config.endpoint, "send ignored, channel is not open");
            return;
        }
        let text = match serde_json::to_string(msg) {
            Ok(text) => text,
            Err(err) => {
                warn!(error = %err, "outbound message not serializable, dropped");
                return;
            }
        };
        if let Some(tx) = &*self.outbound.lock().unwrap() {
            let _ = tx.send(text);
        }
    }

    /// Dial the endpoint. On success the transport loop is spawned and the
    /// subscribe handshake queued; on failure the state drops to `Closed`.
    /// Expects the state to already be `Connecting`.
    async fn open(inner: Arc<Self>) -> Result<(), ChannelError> {
        match connect_async(&inner.config.endpoint).await {
            Ok((transport, _response)) => {
                let (tx, rx) = mpsc::unbounded_channel::<String>();
                *inner.outbound.lock().unwrap() = Some(tx.clone());
                inner.backoff.lock().unwrap().reset();
                *inner.state.write().unwrap() = ChannelState::Open;
                info!(endpoint = %inner.config.endpoint, "channel open");

                match serde_json::to_string(&ClientMessage::SubscribeAll) {
                    Ok(handshake) => {
                        let _ = tx.send(handshake);
                    }
                    Err(err) => warn!(error = %err, "subscribe handshake not serializable"),
                }

                tokio::spawn(Self::run(inner.clone(), transport, rx));
                Ok(())
            }
            Err(err) => {
                *inner.state.write().unwrap() = ChannelState::Closed;
                Err(ChannelError::Connect(err.to_string()))
            }
        }
    }

    /// Transport loop: owns the socket until it closes one way or another.
    async fn run(
        inner: Arc<Self>,
        transport: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        mut outbound_rx: mpsc::UnboundedReceiver<String>,
    ) {
        let (mut sink, mut stream) = transport.split();
        let heartbeat_period = inner.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
        // A disconnect may have raced the open; honor it before serving.
        let mut clean = inner.closing.load(Ordering::SeqCst);

        {
            let shutdown = inner.shutdown.notified();
            tokio::pin!(shutdown);

            while !clean {
                tokio::select! {
                    _ = &mut shutdown => {
                        clean = true;
                    }
                    _ = heartbeat.tick() => {
                        let ping = ClientMessage::Ping { timestamp: now_ms() };
                        let text = match serde_json::to_string(&ping) {
                            Ok(text) => text,
                            Err(_) => continue,
                        };
                        if sink.send(Message::Text(text)).await.is_err() {
                            warn!(endpoint = %inner.config.endpoint, "heartbeat send failed");
                            break;
                        }
                        debug!(endpoint = %inner.config.endpoint, "heartbeat ping sent");
                    }
                    Some(text) = outbound_rx.recv() => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            warn!(endpoint = %inner.config.endpoint, "outbound send failed");
                            break;
                        }
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match ServerMessage::parse(&text) {
                            Ok(msg) => inner.dispatcher.dispatch(&msg),
                            Err(err) => warn!(error = %err, "undecodable frame ignored"),
                        },
                        Some(Ok(Message::Close(close_frame))) => {
                            clean = matches!(&close_frame, Some(f) if f.code == CloseCode::Normal);
                            info!(
                                endpoint = %inner.config.endpoint,
                                clean,
                                "server closed the connection"
                            );
                            break;
                        }
                        Some(Ok(_)) => {} // control/binary frames carry nothing for us
                        Some(Err(err)) => {
                            warn!(endpoint = %inner.config.endpoint, error = %err, "transport error");
                            break;
                        }
                        None => {
                            warn!(endpoint = %inner.config.endpoint, "transport dropped");
                            break;
                        }
                    }
                }
            }
        }

        if clean {
            let close = Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client disconnect".into(),
            }));
            let _ = sink.send(close).await;
        }

        inner.outbound.lock().unwrap().take();
        *inner.state.write().unwrap() = ChannelState::Closed;

        if clean || inner.closing.load(Ordering::SeqCst) {
            info!(endpoint = %inner.config.endpoint, "channel closed");
            return;
        }
        Self::schedule_reconnect(inner);
    }

    /// Arm the reconnect timer, if any attempt budget remains. The timer is
    /// cancelled by `disconnect`.
    fn schedule_reconnect(inner: Arc<Self>) {
        let delay = match inner.backoff.lock().unwrap().next_delay() {
            Some(delay) => delay,
            None => {
                warn!(
                    endpoint = %inner.config.endpoint,
                    "reconnect budget exhausted, automatic recovery stopped"
                );
                return;
            }
        };
        let attempt = inner.backoff.lock().unwrap().attempts();
        info!(
            endpoint = %inner.config.endpoint,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        tokio::spawn(async move {
            {
                let shutdown = inner.shutdown.notified();
                tokio::pin!(shutdown);
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if inner.closing.load(Ordering::SeqCst) {
                return;
            }
            {
                let mut state = inner.state.write().unwrap();
                if matches!(*state, ChannelState::Connecting | ChannelState::Open) {
                    return;
                }
                *state = ChannelState::Connecting;
            }
            if let Err(err) = Self::open(inner.clone()).await {
                warn!(endpoint = %inner.config.endpoint, error = %err, "reconnect attempt failed");
                Self::schedule_reconnect(inner);
            }
        });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as u64
}
