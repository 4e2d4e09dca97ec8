//! The public facade of the socket.io client: the [`SocketIoBuilder`]
//! gathers the configuration and the [`SocketIo`] handle drives the
//! connection, the listeners and the namespace sockets.

use std::{sync::Arc, time::Duration};

use engineioxide_client::{
    ConnectionError, ConnectionState, DisconnectReason, Engine, EngineConfig, Error,
    ProxyAuth, ReconnectConfig,
};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::{client::Client, socket::Socket, value::Value};

/// Configuration of a socket.io client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The inner engine.io config
    pub engine_config: EngineConfig,

    /// The time waited for an acknowledgement by [`Socket::emit_async`]
    /// before failing with a timeout.
    ///
    /// Defaults to 5 seconds.
    pub ack_timeout: Duration,

    /// The time waited for the server reply to a namespace connect
    /// request before closing the namespace.
    ///
    /// Defaults to 20 seconds.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            engine_config: EngineConfig::default(),
            ack_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(20),
        }
    }
}

/// A builder to create a [`SocketIo`] client instance
pub struct SocketIoBuilder {
    config: ClientConfig,
    auth: Option<Value>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl SocketIoBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            auth: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
        }
    }

    /// The reconnection policy applied after a transport loss
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.engine_config.reconnect = reconnect;
        self
    }

    /// Use an http proxy with basic auth
    pub fn proxy_basic_auth(
        mut self,
        uri: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.engine_config.proxy = Some(ProxyAuth {
            uri: uri.into(),
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// The path of the socket.io resource on the server.
    /// Defaults to "/socket.io/".
    pub fn req_path(mut self, req_path: impl Into<String>) -> Self {
        self.config.engine_config.req_path = req_path.into();
        self
    }

    /// The time waited for an acknowledgement by [`Socket::emit_async`]
    /// before failing with a timeout.
    ///
    /// Defaults to 5 seconds.
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.config.ack_timeout = timeout;
        self
    }

    /// The time waited for the server reply to a namespace connect
    /// request before closing the namespace.
    ///
    /// Defaults to 20 seconds.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// The auth payload sent in every namespace CONNECT packet
    pub fn auth(mut self, auth: Value) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Append a query parameter to the connection url.
    /// The value is percent-encoded.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add an http header to the websocket handshake request
    pub fn header(mut self, key: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Build the [`SocketIo`] client
    pub fn build(self) -> SocketIo {
        let client = Client::new(self.config.clone(), self.auth);
        let engine = Engine::new(
            self.config.engine_config,
            client.clone() as Arc<dyn engineioxide_client::EngineHandler>,
        );
        client.set_engine(engine.clone());
        SocketIo {
            client,
            engine,
            query: self.query,
            headers: self.headers,
        }
    }
}

impl Default for SocketIoBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The socket.io client handle.
///
/// It is cheap to clone and safe to share across threads: every method
/// takes `&self`.
#[derive(Clone)]
pub struct SocketIo {
    client: Arc<Client>,
    engine: Arc<Engine>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
}

impl SocketIo {
    /// Create a builder to configure the client
    pub fn builder() -> SocketIoBuilder {
        SocketIoBuilder::new()
    }

    /// Create a client with the default configuration
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Connect to the given server url (`ws://`, `wss://`, `http://` or
    /// `https://`) and keep the session alive until [`SocketIo::close`]
    /// or reconnection exhaustion.
    ///
    /// Calling `connect` while already connecting or connected is a
    /// no-op; calling it after a close waits for the previous session
    /// task to exit first.
    pub async fn connect(&self, url: impl AsRef<str>) -> Result<(), Error> {
        self.engine
            .connect(url.as_ref(), &self.query, self.headers.clone())
            .await
    }

    /// Lookup or create the socket bound to the given namespace.
    /// `""` is normalized to `"/"` and a missing leading slash is added.
    pub fn socket(&self, nsp: impl AsRef<str>) -> Arc<Socket> {
        self.client.socket(nsp.as_ref())
    }

    /// Close the connection: pending reconnections are aborted and no new
    /// attempt will be made. Returns immediately.
    pub fn close(&self) {
        self.engine.close();
    }

    /// Close the connection and wait for the session task to exit
    pub async fn disconnect(&self) {
        self.engine.disconnect().await;
    }

    /// Whether the engine.io handshake completed and the session is up
    pub fn opened(&self) -> bool {
        self.engine.opened()
    }

    /// The current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.engine.state()
    }

    /// The session id assigned by the server on the last handshake
    pub fn session_id(&self) -> Option<String> {
        self.engine.session_id()
    }

    /// The last measured gap between two server heartbeats
    pub fn last_ping_latency(&self) -> Option<Duration> {
        self.engine.last_ping_latency()
    }

    // ==== listeners: one slot each, a new listener replaces the previous ====

    /// Called when the session handshake completes
    pub fn on_open(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.client
            .listeners
            .open
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called when a connection could not be established and no retry
    /// will be made
    pub fn on_fail(&self, listener: impl Fn(ConnectionError) + Send + Sync + 'static) {
        self.client
            .listeners
            .fail
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called when the client starts waiting before a reconnection attempt
    pub fn on_reconnecting(&self, listener: impl Fn() + Send + Sync + 'static) {
        self.client
            .listeners
            .reconnecting
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called on each reconnection attempt with the attempt number and
    /// the delay that was waited (in milliseconds)
    pub fn on_reconnect(&self, listener: impl Fn(u32, u64) + Send + Sync + 'static) {
        self.client
            .listeners
            .reconnect
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called once per connection lifetime with the final close reason
    pub fn on_close(&self, listener: impl Fn(DisconnectReason) + Send + Sync + 'static) {
        self.client
            .listeners
            .close
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called on every connection state transition
    pub fn on_state(&self, listener: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.client
            .listeners
            .state
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called when a namespace becomes connected
    pub fn on_socket_open(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.client
            .listeners
            .socket_open
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Called when a namespace is closed
    pub fn on_socket_close(&self, listener: impl Fn(&str) + Send + Sync + 'static) {
        self.client
            .listeners
            .socket_close
            .lock()
            .unwrap()
            .replace(Arc::new(listener));
    }

    /// Remove every client level listener
    pub fn clear_listeners(&self) {
        let listeners = &self.client.listeners;
        listeners.open.lock().unwrap().take();
        listeners.fail.lock().unwrap().take();
        listeners.reconnecting.lock().unwrap().take();
        listeners.reconnect.lock().unwrap().take();
        listeners.close.lock().unwrap().take();
        listeners.state.lock().unwrap().take();
        listeners.socket_open.lock().unwrap().take();
        listeners.socket_close.lock().unwrap().take();
    }
}

impl Default for SocketIo {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SocketIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIo")
            .field("engine", &self.engine)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.ack_timeout, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(
            config.engine_config.reconnect.delay,
            Duration::from_millis(5000)
        );
        assert_eq!(
            config.engine_config.reconnect.delay_max,
            Duration::from_millis(25000)
        );
        assert_eq!(
            config.engine_config.reconnect.attempts,
            ReconnectConfig::UNLIMITED
        );
    }

    #[tokio::test]
    async fn socket_namespace_normalization() {
        let io = SocketIo::new();
        let root = io.socket("");
        assert_eq!(root.nsp(), "/");
        let admin = io.socket("admin");
        assert_eq!(admin.nsp(), "/admin");
        assert!(Arc::ptr_eq(&io.socket("/admin"), &admin));
    }

    #[tokio::test]
    async fn listener_slots_replace() {
        let io = SocketIo::new();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let h = hits.clone();
        io.on_open(move || {
            h.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        // replaced: the first listener must never fire
        let h = hits.clone();
        io.on_open(move || {
            h.fetch_add(10, std::sync::atomic::Ordering::SeqCst);
        });
        let listener = io.client.listeners.open.lock().unwrap().clone().unwrap();
        listener();
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 10);
    }
}
