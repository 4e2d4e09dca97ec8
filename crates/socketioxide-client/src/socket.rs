//! A [`Socket`] represents the connection to one namespace multiplexed
//! over the shared engine.io session.
//!
//! It owns the per-namespace state: event bindings, the pending
//! acknowledgement table, the outbound queue filled while the namespace
//! is not connected, and the connection metrics.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, RwLock, Weak,
    },
    time::{Duration, SystemTime},
};

use engineioxide_client::Str;
use tokio::{sync::oneshot, task::JoinHandle};

use crate::{
    ack::AckFuture,
    client::Client,
    packet::{Packet, PacketData},
    value::{self, Value},
};

/// Grace period between the user close and the local teardown, waiting
/// for the server disconnect
const CLOSE_GRACE: Duration = Duration::from_millis(3000);

type EventHandler = Arc<dyn Fn(&mut Event) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// An event received from the server: the namespace, the event name, the
/// message list and whether the server expects an acknowledgement.
///
/// A handler wanting to acknowledge fills the ack message list with
/// [`Event::ack`]; the socket then replies with the packet ack id.
#[derive(Debug)]
pub struct Event {
    nsp: Str,
    name: String,
    args: Vec<Value>,
    need_ack: bool,
    ack_message: Vec<Value>,
}

impl Event {
    /// The namespace the event was received on
    pub fn nsp(&self) -> &str {
        &self.nsp
    }

    /// The event name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The arguments of the event: every payload element after the name
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The first argument, for the common single-argument case
    pub fn message(&self) -> Option<&Value> {
        self.args.first()
    }

    /// Whether the server attached an ack id to this event
    pub fn need_ack(&self) -> bool {
        self.need_ack
    }

    /// Fill the acknowledgement message list. It is sent back to the
    /// server once the handlers returned, only when `need_ack` is true.
    pub fn ack(&mut self, args: impl IntoIterator<Item = Value>) {
        if self.need_ack {
            self.ack_message.extend(args);
        }
    }
}

/// Traffic counters and session health info of one namespace socket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionMetrics {
    /// Packets emitted on this namespace
    pub packets_sent: u64,
    /// Packets received on this namespace
    pub packets_received: u64,
    /// Reconnections performed by the underlying engine
    pub reconnection_count: u64,
    /// Last measured gap between two server heartbeats
    pub last_ping_latency: Option<Duration>,
    /// When the namespace last became connected
    pub connected_at: Option<SystemTime>,
}

/// A handle to one namespace of the socket.io connection, obtained from
/// [`SocketIo::socket`](crate::SocketIo::socket).
///
/// The socket is created on first lookup and lives until the namespace is
/// closed (locally or by the server) and every external handle is dropped.
pub struct Socket {
    nsp: Str,
    /// Back-reference to the shared client core, invalidated on teardown
    /// before any externally held handle can observe a closed socket
    client: Mutex<Weak<Client>>,
    connected: AtomicBool,
    sid: Mutex<Option<String>>,
    auth: Mutex<Option<Value>>,

    event_handlers: RwLock<HashMap<String, EventHandler>>,
    any_handler: RwLock<Option<EventHandler>>,
    error_handler: RwLock<Option<ErrorHandler>>,

    /// Pending acknowledgements by id. Ack receipt, per-emit timeout and
    /// cancellation all race on removal: whoever removes the entry wins.
    acks: Mutex<HashMap<i64, oneshot::Sender<Vec<Value>>>>,

    /// Packets emitted while the namespace was not connected, flushed in
    /// fifo order on connection
    queue: Mutex<VecDeque<Packet>>,

    /// One slot shared by the namespace connect timeout and the close
    /// grace timer
    connection_timer: Mutex<Option<JoinHandle<()>>>,

    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    connected_at: Mutex<Option<SystemTime>>,
}

impl Socket {
    pub(crate) fn new(nsp: Str, client: Weak<Client>, auth: Option<Value>) -> Arc<Self> {
        Arc::new(Self {
            nsp,
            client: Mutex::new(client),
            connected: AtomicBool::new(false),
            sid: Mutex::new(None),
            auth: Mutex::new(auth),
            event_handlers: RwLock::new(HashMap::new()),
            any_handler: RwLock::new(None),
            error_handler: RwLock::new(None),
            acks: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            connection_timer: Mutex::new(None),
            packets_sent: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            connected_at: Mutex::new(None),
        })
    }

    /// The namespace of this socket
    pub fn nsp(&self) -> &str {
        &self.nsp
    }

    /// Whether the namespace handshake completed
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// The namespace session id assigned by the server, if connected
    pub fn sid(&self) -> Option<String> {
        self.sid.lock().unwrap().clone()
    }

    /// A snapshot of the connection metrics
    pub fn metrics(&self) -> ConnectionMetrics {
        let client = self.client();
        ConnectionMetrics {
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            reconnection_count: client.as_ref().map(|c| c.reconnect_count()).unwrap_or(0),
            last_ping_latency: client.as_ref().and_then(|c| c.last_ping_latency()),
            connected_at: *self.connected_at.lock().unwrap(),
        }
    }

    /// Bind a handler for the given event name, replacing any previous one
    pub fn on(&self, event: impl Into<String>, handler: impl Fn(&mut Event) + Send + Sync + 'static) {
        self.event_handlers
            .write()
            .unwrap()
            .insert(event.into(), Arc::new(handler));
    }

    /// Remove the handler bound to the given event name
    pub fn off(&self, event: &str) {
        self.event_handlers.write().unwrap().remove(event);
    }

    /// Bind a catch-all handler invoked after the name-specific one,
    /// replacing any previous one
    pub fn on_any(&self, handler: impl Fn(&mut Event) + Send + Sync + 'static) {
        self.any_handler.write().unwrap().replace(Arc::new(handler));
    }

    /// Remove every event binding, including the catch-all
    pub fn off_all(&self) {
        self.event_handlers.write().unwrap().clear();
        self.any_handler.write().unwrap().take();
    }

    /// Bind the error handler, invoked with the server message on a
    /// connect_error packet
    pub fn on_error(&self, handler: impl Fn(&Value) + Send + Sync + 'static) {
        self.error_handler.write().unwrap().replace(Arc::new(handler));
    }

    /// Remove the error handler
    pub fn off_error(&self) {
        self.error_handler.write().unwrap().take();
    }

    /// Emit an event with the given arguments, fire-and-forget.
    /// While the namespace is not connected the packet is queued and
    /// flushed in order on connection.
    pub fn emit(&self, event: impl AsRef<str>, args: impl IntoIterator<Item = Value>) {
        let payload = value::event_payload(event.as_ref(), args);
        self.send_or_queue(Packet::event(self.nsp.clone(), payload));
    }

    /// Emit an event and invoke `ack` with the server acknowledgement,
    /// whenever it arrives.
    pub fn emit_with_ack(
        &self,
        event: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
        ack: impl FnOnce(Vec<Value>) + Send + 'static,
    ) {
        let Some(client) = self.client() else { return };
        let (id, rx) = self.register_ack(&client);
        self.send_event_with_id(event.as_ref(), args, id);
        tokio::spawn(async move {
            if let Ok(data) = rx.await {
                ack(data);
            }
        });
    }

    /// Emit an event and wait at most `timeout` for the acknowledgement:
    /// exactly one of `ack` and `on_timeout` is invoked. A server ack
    /// arriving after the timeout is discarded.
    pub fn emit_with_ack_timeout(
        self: &Arc<Self>,
        event: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
        ack: impl FnOnce(Vec<Value>) + Send + 'static,
        timeout: Duration,
        on_timeout: impl FnOnce() + Send + 'static,
    ) {
        let Some(client) = self.client() else { return };
        let (id, mut rx) = self.register_ack(&client);
        self.send_event_with_id(event.as_ref(), args, id);
        let socket = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                res = &mut rx => {
                    if let Ok(data) = res {
                        ack(data);
                    }
                }
                _ = tokio::time::sleep(timeout) => {
                    // removal is the arbiter: if the entry is gone the ack
                    // handler won and the payload is already in the channel
                    let won = socket
                        .upgrade()
                        .map(|socket| socket.forget_ack(id))
                        .unwrap_or(false);
                    if won {
                        on_timeout();
                    } else if let Ok(data) = rx.try_recv() {
                        ack(data);
                    }
                }
            }
        });
    }

    /// Emit an event and return a future of the acknowledgement, bounded
    /// by the configured ack timeout.
    pub fn emit_async(
        self: &Arc<Self>,
        event: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
    ) -> AckFuture {
        let timeout = self
            .client()
            .map(|client| client.config().ack_timeout)
            .unwrap_or(Duration::from_secs(5));
        self.emit_async_with_timeout(event, args, timeout)
    }

    /// Emit an event and return a future of the acknowledgement, bounded
    /// by the given timeout. Dropping the future cancels the operation.
    pub fn emit_async_with_timeout(
        self: &Arc<Self>,
        event: impl AsRef<str>,
        args: impl IntoIterator<Item = Value>,
        timeout: Duration,
    ) -> AckFuture {
        let Some(client) = self.client() else {
            // the socket is closed: the dropped sender resolves the
            // future with a Closed error
            let (_tx, rx) = oneshot::channel();
            return AckFuture::new(rx, timeout, Weak::new(), 0);
        };
        let (id, rx) = self.register_ack(&client);
        self.send_event_with_id(event.as_ref(), args, id);
        AckFuture::new(rx, timeout, Arc::downgrade(self), id)
    }

    /// Close the namespace: send a disconnect packet and tear down locally
    /// after the server disconnect or a short grace period.
    pub fn close(self: &Arc<Self>) {
        if self.connected() {
            self.send_or_queue(Packet::disconnect(self.nsp.clone()));
            self.arm_connection_timer(CLOSE_GRACE);
        } else {
            self.teardown();
        }
    }

    // ==== lifecycle, driven by the client core ====

    /// The engine completed its handshake: request the namespace
    /// connection and arm the connect timeout.
    pub(crate) fn on_engine_open(self: &Arc<Self>) {
        let Some(client) = self.client() else { return };
        let auth = self.auth.lock().unwrap().clone();
        client.send_packet(Packet::connect(self.nsp.clone(), auth));
        self.arm_connection_timer(client.config().connect_timeout);
    }

    /// The engine session dropped: the namespace is no longer connected
    /// and its queue is cleared. The socket stays registered so a
    /// reconnection can rejoin the namespace.
    pub(crate) fn on_engine_disconnect(&self) {
        if let Some(timer) = self.connection_timer.lock().unwrap().take() {
            timer.abort();
        }
        if self.connected.swap(false, Ordering::AcqRel) {
            self.queue.lock().unwrap().clear();
        }
    }

    /// Receive a packet addressed to this namespace
    pub(crate) fn recv(self: &Arc<Self>, packet: PacketData) {
        match packet {
            PacketData::Connect(payload) => self.on_connected(payload),
            PacketData::Disconnect => self.teardown(),
            PacketData::Event(data, ack) | PacketData::BinaryEvent(data, ack) => {
                self.packets_received.fetch_add(1, Ordering::Relaxed);
                self.recv_event(data, ack);
            }
            PacketData::EventAck(data, ack) | PacketData::BinaryAck(data, ack) => {
                self.packets_received.fetch_add(1, Ordering::Relaxed);
                self.recv_ack(data, ack);
            }
            PacketData::ConnectError(data) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(nsp = %self.nsp, "connect refused: {data:?}");
                let handler = self.error_handler.read().unwrap().clone();
                if let Some(handler) = handler {
                    handler(&data);
                }
            }
        }
    }

    fn on_connected(&self, payload: Option<Value>) {
        if let Some(timer) = self.connection_timer.lock().unwrap().take() {
            timer.abort();
        }
        if self.connected.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sid) = payload.as_ref().and_then(|p| p.get("sid")).and_then(Value::as_str) {
            self.sid.lock().unwrap().replace(sid.to_string());
        }
        self.connected_at.lock().unwrap().replace(SystemTime::now());
        #[cfg(feature = "tracing")]
        tracing::debug!(nsp = %self.nsp, "namespace connected");

        let client = self.client();
        if let Some(client) = &client {
            client.notify_socket_open(&self.nsp);
        }
        // Flush the packets emitted while disconnected, in order, before
        // anything submitted after this transition
        let packets: Vec<Packet> = self.queue.lock().unwrap().drain(..).collect();
        if let Some(client) = &client {
            for packet in packets {
                self.transmit(client, packet);
            }
        }
    }

    fn recv_event(&self, data: Value, ack: Option<i64>) {
        let Value::Array(mut items) = data else {
            #[cfg(feature = "tracing")]
            tracing::debug!(nsp = %self.nsp, "dropping event with a non-array payload");
            return;
        };
        if items.is_empty() || !matches!(items[0], Value::Str(_)) {
            #[cfg(feature = "tracing")]
            tracing::debug!(nsp = %self.nsp, "dropping event without a name");
            return;
        }
        let Value::Str(name) = items.remove(0) else {
            unreachable!("the payload head was checked to be a string")
        };
        let mut event = Event {
            nsp: self.nsp.clone(),
            name,
            args: items,
            need_ack: ack.is_some(),
            ack_message: Vec::new(),
        };

        // Handlers are cloned out so no lock is held across a user callback
        let named = self.event_handlers.read().unwrap().get(event.name()).cloned();
        let any = self.any_handler.read().unwrap().clone();
        if let Some(handler) = named {
            handler(&mut event);
        }
        if let Some(handler) = any {
            handler(&mut event);
        }

        if let (Some(id), false) = (ack, event.ack_message.is_empty()) {
            let payload = Value::Array(event.ack_message);
            self.send_or_queue(Packet::ack(self.nsp.clone(), payload, id));
        }
    }

    fn recv_ack(&self, data: Value, id: i64) {
        // Unknown or duplicate ack ids are silently ignored
        if let Some(tx) = self.acks.lock().unwrap().remove(&id) {
            if let Some(data) = value::into_message_list(data) {
                tx.send(data).ok();
            }
        }
    }

    /// Tear the namespace down: cancel timers, drop the queue and the
    /// pending acks, invalidate the back-reference and deregister.
    pub(crate) fn teardown(&self) {
        if let Some(timer) = self.connection_timer.lock().unwrap().take() {
            timer.abort();
        }
        self.connected.store(false, Ordering::Release);
        self.queue.lock().unwrap().clear();
        // Dropping the senders resolves every pending ack as closed
        self.acks.lock().unwrap().clear();

        let client = std::mem::replace(&mut *self.client.lock().unwrap(), Weak::new());
        if let Some(client) = client.upgrade() {
            #[cfg(feature = "tracing")]
            tracing::debug!(nsp = %self.nsp, "closing namespace");
            client.notify_socket_close(&self.nsp);
            client.remove_socket(&self.nsp);
        }
    }

    // ==== internals ====

    fn client(&self) -> Option<Arc<Client>> {
        self.client.lock().unwrap().upgrade()
    }

    pub(crate) fn forget_ack(&self, id: i64) -> bool {
        self.acks.lock().unwrap().remove(&id).is_some()
    }

    fn register_ack(&self, client: &Arc<Client>) -> (i64, oneshot::Receiver<Vec<Value>>) {
        let id = client.next_ack_id();
        let (tx, rx) = oneshot::channel();
        self.acks.lock().unwrap().insert(id, tx);
        (id, rx)
    }

    fn send_event_with_id(
        &self,
        event: &str,
        args: impl IntoIterator<Item = Value>,
        id: i64,
    ) {
        let payload = value::event_payload(event, args);
        let mut packet = Packet::event(self.nsp.clone(), payload);
        packet.inner.set_ack_id(id);
        self.send_or_queue(packet);
    }

    fn send_or_queue(&self, packet: Packet) {
        if self.connected() {
            if let Some(client) = self.client() {
                self.transmit(&client, packet);
                return;
            }
        }
        self.queue.lock().unwrap().push_back(packet);
    }

    fn transmit(&self, client: &Arc<Client>, packet: Packet) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        client.send_packet(packet);
    }

    /// Arm the shared namespace timer, replacing any previous one. Both
    /// expiries (connect timeout, close grace) end in a local teardown.
    fn arm_connection_timer(self: &Arc<Self>, delay: Duration) {
        let socket = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(socket) = socket.upgrade() {
                #[cfg(feature = "tracing")]
                tracing::debug!(nsp = %socket.nsp, "namespace timer expired");
                socket.teardown();
            }
        });
        if let Some(prev) = self.connection_timer.lock().unwrap().replace(handle) {
            prev.abort();
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("nsp", &self.nsp)
            .field("connected", &self.connected)
            .field("sid", &self.sid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use engineioxide_client::EngineHandler;

    use super::*;
    use crate::{errors::AckError, io::ClientConfig, parser::Parser};

    fn create_client() -> Arc<Client> {
        Client::new(ClientConfig::default(), None)
    }

    fn sent_frames(client: &Arc<Client>) -> Vec<String> {
        client
            .sent
            .lock()
            .unwrap()
            .iter()
            .map(|p| String::from(Parser.encode(p.clone()).0))
            .collect()
    }

    #[tokio::test]
    async fn emits_before_connect_flush_in_order() {
        let client = create_client();
        let socket = client.socket("/");
        socket.emit("first", [Value::from(1)]);
        socket.emit("second", [Value::from(2)]);
        assert!(sent_frames(&client).is_empty());

        client.on_message("0{}".to_string().into());
        socket.emit("third", [Value::from(3)]);
        assert_eq!(
            sent_frames(&client),
            vec![
                "2[\"first\",1]".to_string(),
                "2[\"second\",2]".to_string(),
                "2[\"third\",3]".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn text_event_wire_form() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());
        socket.emit("chat", [Value::from("hello"), Value::from(42)]);
        assert_eq!(sent_frames(&client), vec!["2[\"chat\",\"hello\",42]".to_string()]);
    }

    #[tokio::test]
    async fn ack_callback_receives_the_message_list() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let acked = Arc::new(Mutex::new(None));
        let acked2 = acked.clone();
        socket.emit_with_ack("ping", [], move |data| {
            acked2.lock().unwrap().replace(data);
        });
        assert_eq!(sent_frames(&client), vec!["21[\"ping\"]".to_string()]);

        client.on_message("31[\"pong\"]".to_string().into());
        // the callback runs on a spawned task
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*acked.lock().unwrap(), Some(vec![Value::from("pong")]));
    }

    #[tokio::test]
    async fn ack_timeout_fires_exactly_once_and_late_ack_is_discarded() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let acks = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(AtomicUsize::new(0));
        let (a, t) = (acks.clone(), timeouts.clone());
        socket.emit_with_ack_timeout(
            "ping",
            [],
            move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(30),
            move || {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );
        tokio::time::sleep(Duration::from_millis(80)).await;
        // a late ack for the same id must be ignored
        client.on_message("31[\"late\"]".to_string().into());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(acks.load(Ordering::SeqCst), 0);
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
        assert!(socket.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ack_before_timeout_wins() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let acks = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(AtomicUsize::new(0));
        let (a, t) = (acks.clone(), timeouts.clone());
        socket.emit_with_ack_timeout(
            "ping",
            [],
            move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(500),
            move || {
                t.fetch_add(1, Ordering::SeqCst);
            },
        );
        client.on_message("31[\"pong\"]".to_string().into());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(acks.load(Ordering::SeqCst), 1);
        assert_eq!(timeouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn emit_async_resolves_with_the_ack() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let fut = socket.emit_async("ping", []);
        client.on_message("31[\"pong\"]".to_string().into());
        assert_eq!(fut.await, Ok(vec![Value::from("pong")]));
    }

    #[tokio::test]
    async fn emit_async_times_out() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let fut = socket.emit_async_with_timeout("ping", [], Duration::from_millis(30));
        assert_eq!(fut.await, Err(AckError::Timeout));
        assert!(socket.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_ack_future_withdraws_the_entry() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());

        let fut = socket.emit_async("ping", []);
        assert_eq!(socket.acks.lock().unwrap().len(), 1);
        drop(fut);
        assert!(socket.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn user_close_sends_disconnect_and_tears_down_on_server_reply() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());
        assert!(socket.connected());

        socket.close();
        assert_eq!(sent_frames(&client), vec!["1".to_string()]);
        // server confirms before the grace period expires
        client.on_message("1".to_string().into());
        assert!(!socket.connected());
        assert!(client.get_socket("/").is_none());
    }

    #[tokio::test]
    async fn namespace_connect_timeout_closes_the_socket() {
        let config = ClientConfig {
            connect_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let client = Client::new(config, None);
        let socket = client.socket("/");
        client.on_open();
        assert_eq!(sent_frames(&client), vec!["0".to_string()]);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!socket.connected());
        assert!(client.get_socket("/").is_none());
    }

    #[tokio::test]
    async fn engine_disconnect_keeps_the_socket_registered() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());
        assert!(socket.connected());

        client.on_disconnect();
        assert!(!socket.connected());
        assert!(client.get_socket("/").is_some());

        // a reconnection rejoins the namespace
        client.on_open();
        client.on_message("0{}".to_string().into());
        assert!(socket.connected());
    }

    #[tokio::test]
    async fn auth_payload_rides_the_connect_packet() {
        let auth: Value = [("token".to_string(), Value::from("x"))].into_iter().collect();
        let client = Client::new(ClientConfig::default(), Some(auth));
        let _socket = client.socket("/admin");
        client.on_open();
        assert_eq!(
            sent_frames(&client),
            vec!["0/admin,{\"token\":\"x\"}".to_string()]
        );
    }

    #[tokio::test]
    async fn need_ack_reply_uses_the_event_id() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());
        socket.on("ping", |event| {
            event.ack([Value::from("pong")]);
        });
        client.on_message("217[\"ping\"]".to_string().into());
        assert_eq!(sent_frames(&client), vec!["317[\"pong\"]".to_string()]);
    }

    #[tokio::test]
    async fn handler_without_ack_message_sends_nothing() {
        let client = create_client();
        let socket = client.socket("/");
        client.on_message("0{}".to_string().into());
        socket.on("ping", |_| {});
        client.on_message("217[\"ping\"]".to_string().into());
        assert!(sent_frames(&client).is_empty());
    }

    #[tokio::test]
    async fn connect_error_reaches_the_error_handler() {
        let client = create_client();
        let socket = client.socket("/");
        let seen = Arc::new(Mutex::new(None));
        let seen2 = seen.clone();
        socket.on_error(move |message| {
            seen2.lock().unwrap().replace(message.clone());
        });
        client.on_message("4{\"message\":\"Invalid namespace\"}".to_string().into());
        let expected: Value = [("message".to_string(), Value::from("Invalid namespace"))]
            .into_iter()
            .collect();
        assert_eq!(*seen.lock().unwrap(), Some(expected));
    }
}
