//! The connection engine: it owns the websocket transport and drives the
//! whole session lifecycle from a single supervisor task per `connect()`:
//!
//! ```text
//! disconnected ──connect()──▶ connecting
//! connecting ──transport open + OPEN frame──▶ connected
//! connecting ──transport fail──▶ reconnecting (retries remain) | disconnected
//! connected ──ping timeout | transport close | server close──▶ reconnecting | disconnected
//! closing ──transport close──▶ disconnected
//! ```
//!
//! All transport callbacks, heartbeat checks and reconnection timers run on
//! that task, so [`EngineHandler`] callbacks are serialized in receive order.

use std::sync::{
    atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use futures_util::StreamExt;
use http::HeaderMap;
use smallvec::smallvec;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::{
    config::EngineConfig,
    errors::{ConnectionError, Error},
    handler::EngineHandler,
    packet::Packet,
    transport::{forward_to_transport, ConnectTarget, PacketBuf, WsStream},
    Str,
};

/// The connection state of the engine, observable at any time through
/// [`Engine::state`] and on every transition through
/// [`EngineHandler::on_state`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No session and no pending retry
    Disconnected = 0,
    /// A dial is in flight or the OPEN handshake is awaited
    Connecting = 1,
    /// The OPEN handshake completed
    Connected = 2,
    /// A reconnection timer is armed
    Reconnecting = 3,
    /// The user asked to close, waiting for the transport to go down
    Closing = 4,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Closing,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// A [`DisconnectReason`] represents the reason why the connection was
/// finally closed. It is surfaced once per connection lifetime through
/// [`EngineHandler::on_close`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The user called `close()`
    ClientDisconnect,
    /// The server cleanly closed the session
    ServerDisconnect,
    /// The connection was abruptly closed
    TransportError,
    /// The server stopped sending PING packets in time
    PingTimeout,
    /// All the reconnection attempts were exhausted
    MaxReconnectAttempts,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use DisconnectReason::*;
        let str: &'static str = match self {
            ClientDisconnect => "client closed the connection",
            ServerDisconnect => "server closed the session",
            TransportError => "the connection was abruptly closed",
            PingTimeout => "server did not send a PING packet in time",
            MaxReconnectAttempts => "reconnection attempts exhausted",
        };
        f.write_str(str)
    }
}

/// How a single transport session ended, before the reconnection decision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SessionEnd {
    /// The user closed the engine
    ClientClose,
    /// The server sent an engine.io CLOSE packet or a clean websocket close
    ServerClose,
    /// The transport errored or closed abnormally
    TransportError,
    /// No server PING within `ping_interval + ping_timeout`
    PingTimeout,
    /// The OPEN handshake was invalid
    ProtocolViolation,
    /// The websocket could not be opened at all
    DialFailed(ConnectionError),
}

impl SessionEnd {
    fn reason(&self) -> DisconnectReason {
        match self {
            SessionEnd::ClientClose => DisconnectReason::ClientDisconnect,
            SessionEnd::ServerClose => DisconnectReason::ServerDisconnect,
            SessionEnd::PingTimeout => DisconnectReason::PingTimeout,
            SessionEnd::TransportError
            | SessionEnd::ProtocolViolation
            | SessionEnd::DialFailed(_) => DisconnectReason::TransportError,
        }
    }
}

/// State shared between the engine facade and its supervisor task
struct Shared {
    state: AtomicU8,
    sid: Mutex<Option<String>>,
    attempts_made: AtomicU32,
    abort_retries: AtomicBool,
    /// One-shot reason consumed by the close path, taking priority over
    /// the reason inferred from how the session ended
    pending_reason: Mutex<Option<DisconnectReason>>,
    last_ping_latency_ms: AtomicU64,
    /// Outbound channel of the current session, if any
    session_tx: Mutex<Option<mpsc::Sender<PacketBuf>>>,
    /// Close signal, recreated on each `connect()`
    closed: Mutex<watch::Sender<bool>>,
    target: Mutex<Option<ConnectTarget>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState, handler: &Arc<dyn EngineHandler>) {
        let prev = self.state.swap(state as u8, Ordering::AcqRel);
        if prev != state as u8 {
            handler.on_state(state);
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn sid(&self) -> Option<String> {
        self.sid.lock().unwrap().clone()
    }
}

/// The client side engine.io connection engine.
///
/// It owns the websocket transport, performs the OPEN handshake, answers
/// the server heartbeat and transparently reconnects with exponential
/// backoff. Inbound traffic is delivered to the provided [`EngineHandler`].
pub struct Engine {
    config: EngineConfig,
    handler: Arc<dyn EngineHandler>,
    shared: Arc<Shared>,
    supervisor: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Engine {
    /// Create a new engine delivering its events to `handler`
    pub fn new(config: EngineConfig, handler: Arc<dyn EngineHandler>) -> Arc<Self> {
        Arc::new(Self {
            config,
            handler,
            shared: Arc::new(Shared {
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
                sid: Mutex::new(None),
                attempts_made: AtomicU32::new(0),
                abort_retries: AtomicBool::new(false),
                pending_reason: Mutex::new(None),
                last_ping_latency_ms: AtomicU64::new(0),
                session_tx: Mutex::new(None),
                closed: Mutex::new(watch::channel(false).0),
                target: Mutex::new(None),
            }),
            supervisor: tokio::sync::Mutex::new(None),
        })
    }

    /// Open a connection to the given url and keep it alive until
    /// [`Engine::close`] is called or the reconnection policy gives up.
    ///
    /// Calling `connect` while a connection is established or being
    /// established is a no-op. Calling it again after a close first joins
    /// the previous supervisor task.
    pub async fn connect(
        &self,
        url: &str,
        query: &[(String, String)],
        headers: HeaderMap,
    ) -> Result<(), Error> {
        let mut supervisor = self.supervisor.lock().await;
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            return Ok(());
        }
        if let Some(handle) = supervisor.take() {
            handle.await.ok();
        }

        let target = ConnectTarget::parse(url, query, headers, &self.config)?;
        let shared = &self.shared;
        *shared.target.lock().unwrap() = Some(target);
        shared.abort_retries.store(false, Ordering::Release);
        shared.attempts_made.store(0, Ordering::Release);
        shared.pending_reason.lock().unwrap().take();
        shared.sid.lock().unwrap().take();
        *shared.closed.lock().unwrap() = watch::channel(false).0;
        shared.set_state(ConnectionState::Connecting, &self.handler);

        *supervisor = Some(tokio::spawn(run(
            shared.clone(),
            self.handler.clone(),
            self.config.clone(),
        )));
        Ok(())
    }

    /// Send a message packet to the server.
    /// Dropped with a debug log when no transport is open.
    pub fn send(&self, msg: Str) {
        self.send_buf(smallvec![Packet::Message(msg)]);
    }

    /// Send a message packet directly followed by its binary attachments.
    /// The frames are enqueued atomically so no other packet can be
    /// interleaved between the header and its attachments.
    pub fn send_many(&self, msg: Str, bins: Vec<bytes::Bytes>) {
        let mut buf = PacketBuf::with_capacity(bins.len() + 1);
        buf.push(Packet::Message(msg));
        for bin in bins {
            buf.push(Packet::Binary(bin));
        }
        self.send_buf(buf);
    }

    /// Send a single binary packet to the server
    pub fn send_binary(&self, data: bytes::Bytes) {
        self.send_buf(smallvec![Packet::Binary(data)]);
    }

    fn send_buf(&self, buf: PacketBuf) {
        let tx = self.shared.session_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => {
                if let Err(_e) = tx.try_send(buf) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("error buffering packet: {_e}");
                }
            }
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("transport not open, dropping packet");
            }
        }
    }

    /// Ask the engine to close: abort any pending retry, close the
    /// transport and prevent subsequent reconnection attempts.
    /// Returns immediately; use [`Engine::disconnect`] to wait.
    pub fn close(&self) {
        self.shared.abort_retries.store(true, Ordering::Release);
        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Reconnecting
        ) {
            self.shared.set_state(ConnectionState::Closing, &self.handler);
        }
        self.shared.closed.lock().unwrap().send_replace(true);
    }

    /// Close the engine and wait for the supervisor task to exit
    pub async fn disconnect(&self) {
        self.close();
        let handle = self.supervisor.lock().await.take();
        if let Some(handle) = handle {
            handle.await.ok();
        }
    }

    /// The current connection state
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the engine completed its handshake and is currently connected
    pub fn opened(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The session id assigned by the server on the last handshake
    pub fn session_id(&self) -> Option<String> {
        self.shared.sid()
    }

    /// The last measured gap between two server PING packets
    pub fn last_ping_latency(&self) -> Option<Duration> {
        match self.shared.last_ping_latency_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state())
            .field("sid", &self.shared.sid())
            .field("attempts_made", &self.shared.attempts_made)
            .finish()
    }
}

/// The supervisor loop: dial, run the session, decide whether to retry
async fn run(shared: Arc<Shared>, handler: Arc<dyn EngineHandler>, config: EngineConfig) {
    let mut closed_rx = shared.closed.lock().unwrap().subscribe();
    loop {
        // A close that raced the supervisor spawn is only visible here
        if shared.abort_retries.load(Ordering::Acquire) {
            shared.set_state(ConnectionState::Disconnected, &handler);
            handler.on_close(DisconnectReason::ClientDisconnect);
            break;
        }
        shared.set_state(ConnectionState::Connecting, &handler);
        let target = shared
            .target
            .lock()
            .unwrap()
            .clone()
            .expect("connect target is set before the supervisor is spawned");
        let sid = shared.sid();

        let end = tokio::select! {
            _ = closed_rx.changed() => SessionEnd::ClientClose,
            res = target.connect(sid.as_deref(), &config) => match res {
                Ok(ws) => session(&shared, &handler, &config, ws, &mut closed_rx).await,
                Err(ref _e) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("connection failed: {_e}");
                    SessionEnd::DialFailed(ConnectionError::from(_e))
                }
            }
        };

        let user_closed = shared.abort_retries.load(Ordering::Acquire)
            || matches!(end, SessionEnd::ClientClose);
        let pending = shared.pending_reason.lock().unwrap().take();

        // A session that never dialed has nothing to tear down above
        if !matches!(end, SessionEnd::DialFailed(_)) {
            handler.on_disconnect();
        }

        if user_closed {
            shared.set_state(ConnectionState::Disconnected, &handler);
            handler.on_close(pending.unwrap_or(DisconnectReason::ClientDisconnect));
            break;
        }

        let reconnect = &config.reconnect;
        let attempts_made = shared.attempts_made.load(Ordering::Acquire);
        if reconnect.enabled && attempts_made < reconnect.attempts {
            shared.set_state(ConnectionState::Reconnecting, &handler);
            handler.on_reconnecting();
            let delay = reconnect.next_delay(attempts_made);
            #[cfg(feature = "tracing")]
            tracing::debug!(?delay, attempts_made, "scheduling reconnection");
            let aborted = tokio::select! {
                _ = closed_rx.changed() => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if aborted || shared.abort_retries.load(Ordering::Acquire) {
                shared.set_state(ConnectionState::Disconnected, &handler);
                handler.on_close(DisconnectReason::ClientDisconnect);
                break;
            }
            let attempt = shared.attempts_made.fetch_add(1, Ordering::AcqRel) + 1;
            handler.on_reconnect(attempt, delay.as_millis() as u64);
            continue;
        }

        // No retry left: surface the dial failure, then close for good
        if let SessionEnd::DialFailed(err) = end {
            handler.on_fail(err);
        }
        let reason = pending.unwrap_or_else(|| {
            if reconnect.enabled {
                DisconnectReason::MaxReconnectAttempts
            } else {
                end.reason()
            }
        });
        shared.set_state(ConnectionState::Disconnected, &handler);
        handler.on_close(reason);
        break;
    }
}

/// Run one transport session until it ends: spawn the writer task and
/// consume the inbound stream
async fn session(
    shared: &Arc<Shared>,
    handler: &Arc<dyn EngineHandler>,
    config: &EngineConfig,
    ws: WsStream,
    closed_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let (sink, stream) = ws.split();
    let (tx, rx) = mpsc::channel(config.max_buffer_size);
    *shared.session_tx.lock().unwrap() = Some(tx.clone());
    let mut writer = forward_to_transport(sink, rx);

    let end = read_loop(shared, handler, &tx, stream, closed_rx).await;

    shared.session_tx.lock().unwrap().take();
    // Give the writer a chance to push a close frame to the server
    tx.try_send(smallvec![Packet::Close]).ok();
    drop(tx);
    if tokio::time::timeout(Duration::from_secs(1), &mut writer)
        .await
        .is_err()
    {
        writer.abort();
    }
    end
}

/// The inbound loop of a session. The heartbeat deadline is re-armed on
/// the OPEN handshake and on every server PING; its expiry ends the
/// session with a pending `PingTimeout` reason.
async fn read_loop(
    shared: &Arc<Shared>,
    handler: &Arc<dyn EngineHandler>,
    tx: &mpsc::Sender<PacketBuf>,
    mut stream: futures_util::stream::SplitStream<WsStream>,
    closed_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let mut deadline: Option<Instant> = None;
    let mut heartbeat = Duration::ZERO;
    let mut last_ping: Option<Instant> = None;

    loop {
        let heartbeat_expiry = async {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };
        let msg = tokio::select! {
            _ = closed_rx.changed() => return SessionEnd::ClientClose,
            _ = heartbeat_expiry => {
                #[cfg(feature = "tracing")]
                tracing::debug!("ping timeout, closing session");
                shared
                    .pending_reason
                    .lock()
                    .unwrap()
                    .replace(DisconnectReason::PingTimeout);
                return SessionEnd::PingTimeout;
            }
            msg = stream.next() => msg,
        };

        match msg {
            None => return SessionEnd::TransportError,
            Some(Err(_e)) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("transport error: {_e}");
                return SessionEnd::TransportError;
            }
            Some(Ok(Message::Text(msg))) => match Packet::try_from(ws_bytes_to_str(msg)) {
                Ok(Packet::Open(open)) => {
                    if open.sid.is_empty() {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("handshake without session id");
                        return SessionEnd::ProtocolViolation;
                    }
                    #[cfg(feature = "tracing")]
                    tracing::debug!(sid = %open.sid, "handshake completed");
                    heartbeat = open.heartbeat_deadline();
                    deadline = Some(Instant::now() + heartbeat);
                    shared.sid.lock().unwrap().replace(open.sid);
                    // The retry budget renews only on a completed handshake
                    shared.attempts_made.store(0, Ordering::Release);
                    shared.set_state(ConnectionState::Connected, handler);
                    handler.on_open();
                }
                Ok(Packet::Ping) => {
                    let now = Instant::now();
                    if let Some(prev) = last_ping {
                        shared
                            .last_ping_latency_ms
                            .store((now - prev).as_millis() as u64, Ordering::Relaxed);
                    }
                    last_ping = Some(now);
                    tx.try_send(smallvec![Packet::Pong]).ok();
                    if heartbeat > Duration::ZERO {
                        deadline = Some(now + heartbeat);
                    }
                }
                Ok(Packet::Close) => return SessionEnd::ServerClose,
                Ok(Packet::Message(msg)) => handler.on_message(msg),
                Ok(_p) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("unexpected engine.io packet: {_p:?}");
                }
                Err(_e) => {
                    // Parse failures are local, the frame is dropped and
                    // the session continues
                    #[cfg(feature = "tracing")]
                    tracing::debug!("dropping malformed frame: {_e}");
                }
            },
            Some(Ok(Message::Binary(data))) => handler.on_binary(data),
            Some(Ok(Message::Close(frame))) => {
                let clean = frame
                    .as_ref()
                    .map(|f| matches!(u16::from(f.code), 1000 | 1001))
                    .unwrap_or(false);
                return if clean {
                    SessionEnd::ServerClose
                } else {
                    SessionEnd::TransportError
                };
            }
            // Websocket level ping/pong frames are handled by tungstenite
            Some(Ok(_)) => {}
        }
    }
}

fn ws_bytes_to_str(bytes: tungstenite::Utf8Bytes) -> Str {
    // SAFETY: tungstenite guarantees the bytes of a text frame are valid utf8
    unsafe { Str::from_bytes_unchecked(bytes.into()) }
}
