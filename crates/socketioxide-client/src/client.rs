//! The client core: it implements [`EngineHandler`] to receive the
//! engine.io callbacks, decodes socket.io packets and routes them to the
//! addressed namespace socket.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex, OnceLock, RwLock,
    },
    time::Duration,
};

use bytes::Bytes;
use engineioxide_client::{
    ConnectionError, ConnectionState, DisconnectReason, Engine, EngineHandler, Str,
};

use crate::{
    io::ClientConfig,
    packet::Packet,
    parser::{ParseError, Parser, ParserState},
    socket::Socket,
    value::Value,
};

type Listener<T> = Mutex<Option<Arc<T>>>;

/// Client level listeners. One slot per event, each guarded individually;
/// setting a listener replaces the previous one.
#[derive(Default)]
pub(crate) struct Listeners {
    pub open: Listener<dyn Fn() + Send + Sync>,
    pub fail: Listener<dyn Fn(ConnectionError) + Send + Sync>,
    pub reconnecting: Listener<dyn Fn() + Send + Sync>,
    pub reconnect: Listener<dyn Fn(u32, u64) + Send + Sync>,
    pub close: Listener<dyn Fn(DisconnectReason) + Send + Sync>,
    pub state: Listener<dyn Fn(ConnectionState) + Send + Sync>,
    pub socket_open: Listener<dyn Fn(&str) + Send + Sync>,
    pub socket_close: Listener<dyn Fn(&str) + Send + Sync>,
}

/// Take a clone of a listener slot and invoke it outside the lock
macro_rules! notify {
    ($slot:expr $(, $arg:expr)*) => {
        let listener = $slot.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener($($arg),*);
        }
    };
}

pub(crate) struct Client {
    config: ClientConfig,
    /// Set once by the builder, right after the engine is created around
    /// this client
    engine: OnceLock<Arc<Engine>>,
    parser: Parser,
    state: ParserState,
    sockets: RwLock<HashMap<Str, Arc<Socket>>>,
    pub(crate) listeners: Listeners,
    /// Auth payload handed to namespace sockets at creation
    auth: Mutex<Option<Value>>,
    /// Ack ids are globally unique across every namespace
    ack_counter: AtomicI64,
    reconnect_count: AtomicU64,

    /// Outbound packets captured for inspection when no engine is bound
    #[cfg(test)]
    pub(crate) sent: Mutex<Vec<Packet>>,
}

// ==== impl Client ====

impl Client {
    pub(crate) fn new(config: ClientConfig, auth: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            config,
            engine: OnceLock::new(),
            parser: Parser,
            state: ParserState::default(),
            sockets: RwLock::new(HashMap::new()),
            listeners: Listeners::default(),
            auth: Mutex::new(auth),
            ack_counter: AtomicI64::new(0),
            reconnect_count: AtomicU64::new(0),
            #[cfg(test)]
            sent: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn set_engine(&self, engine: Arc<Engine>) {
        self.engine
            .set(engine)
            .unwrap_or_else(|_| unreachable!("the engine is set once by the builder"));
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn next_ack_id(&self) -> i64 {
        self.ack_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    pub(crate) fn last_ping_latency(&self) -> Option<Duration> {
        self.engine.get().and_then(|e| e.last_ping_latency())
    }

    /// Lookup or create the socket of a namespace. The name is
    /// normalized first: empty becomes the root namespace and a missing
    /// leading slash is added.
    pub(crate) fn socket(self: &Arc<Self>, nsp: &str) -> Arc<Socket> {
        let nsp = normalize_nsp(nsp);
        if let Some(socket) = self.sockets.read().unwrap().get(nsp.as_str()) {
            return socket.clone();
        }
        let (socket, created) = {
            let mut sockets = self.sockets.write().unwrap();
            match sockets.entry(Str::from(nsp.clone())) {
                std::collections::hash_map::Entry::Occupied(entry) => (entry.get().clone(), false),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(nsp = %nsp, "creating namespace socket");
                    let socket = Socket::new(
                        Str::from(nsp),
                        Arc::downgrade(self),
                        self.auth.lock().unwrap().clone(),
                    );
                    (entry.insert(socket).clone(), true)
                }
            }
        };
        // A socket created on a live session joins its namespace right away
        if created && self.engine.get().map(|e| e.opened()).unwrap_or(false) {
            socket.on_engine_open();
        }
        socket
    }

    pub(crate) fn get_socket(&self, nsp: &str) -> Option<Arc<Socket>> {
        self.sockets.read().unwrap().get(nsp).cloned()
    }

    pub(crate) fn remove_socket(&self, nsp: &str) {
        self.sockets.write().unwrap().remove(nsp);
    }

    pub(crate) fn notify_socket_open(&self, nsp: &str) {
        notify!(self.listeners.socket_open, nsp);
    }

    pub(crate) fn notify_socket_close(&self, nsp: &str) {
        notify!(self.listeners.socket_close, nsp);
    }

    /// Encode and hand a packet to the engine. The text header and its
    /// binary attachments are dispatched as one atomic unit.
    pub(crate) fn send_packet(&self, packet: Packet) {
        #[cfg(test)]
        self.sent.lock().unwrap().push(packet.clone());
        let Some(engine) = self.engine.get() else {
            #[cfg(feature = "tracing")]
            tracing::debug!("no engine bound, dropping packet");
            return;
        };
        let (text, bins) = self.parser.encode(packet);
        if bins.is_empty() {
            engine.send(text);
        } else {
            engine.send_many(text, bins);
        }
    }

    fn sockets_snapshot(&self) -> Vec<Arc<Socket>> {
        self.sockets.read().unwrap().values().cloned().collect()
    }

    /// Propagate a packet to its target namespace
    fn route(&self, packet: Packet) {
        match self.get_socket(&packet.ns) {
            Some(socket) => socket.recv(packet.inner),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("dropping packet for unknown namespace: {}", packet.ns);
            }
        }
    }
}

impl EngineHandler for Client {
    fn on_open(&self) {
        for socket in self.sockets_snapshot() {
            socket.on_engine_open();
        }
        notify!(self.listeners.open);
    }

    fn on_message(&self, msg: Str) {
        let packet = match self.parser.decode_str(&self.state, msg) {
            Ok(packet) => packet,
            Err(ParseError::NeedsMoreBinaryData) => return,
            Err(_e) => {
                // Parse failures are local: the frame is dropped and the
                // session continues
                #[cfg(feature = "tracing")]
                tracing::debug!("packet deserialization error: {_e}");
                return;
            }
        };
        self.route(packet);
    }

    fn on_binary(&self, data: Bytes) {
        let packet = match self.parser.decode_bin(&self.state, data) {
            Ok(packet) => packet,
            Err(ParseError::NeedsMoreBinaryData) => return,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("binary deserialization error: {_e}");
                return;
            }
        };
        self.route(packet);
    }

    fn on_disconnect(&self) {
        for socket in self.sockets_snapshot() {
            socket.on_engine_disconnect();
        }
    }

    fn on_close(&self, reason: DisconnectReason) {
        notify!(self.listeners.close, reason);
    }

    fn on_fail(&self, error: ConnectionError) {
        notify!(self.listeners.fail, error);
    }

    fn on_reconnecting(&self) {
        notify!(self.listeners.reconnecting);
    }

    fn on_reconnect(&self, attempt: u32, delay_ms: u64) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
        notify!(self.listeners.reconnect, attempt, delay_ms);
    }

    fn on_state(&self, state: ConnectionState) {
        notify!(self.listeners.state, state);
    }
}

/// Normalize a namespace name: `""` is the root namespace and a missing
/// leading slash is added.
fn normalize_nsp(nsp: &str) -> String {
    if nsp.is_empty() {
        "/".to_string()
    } else if !nsp.starts_with('/') {
        format!("/{nsp}")
    } else {
        nsp.to_string()
    }
}
