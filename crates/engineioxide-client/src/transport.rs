//! The transport module owns the websocket side of a session:
//! url composition, the websocket handshake and the task forwarding
//! outbound packets to the websocket sink.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose, Engine as _};
use futures_util::{stream::SplitSink, SinkExt};
use http::HeaderMap;
use smallvec::SmallVec;
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, Message},
    MaybeTlsStream, WebSocketStream,
};

use crate::{config::EngineConfig, errors::Error, packet::Packet};

/// The websocket stream type used by the whole crate
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Buffered packets to send to the server.
/// A text packet and its adjacent binary payloads are queued as one unit
/// so nothing can be interleaved between them.
pub(crate) type PacketBuf = SmallVec<[Packet; 2]>;

/// The resolved connection target: everything needed to (re)compose the
/// websocket url on each dial.
#[derive(Debug, Clone)]
pub(crate) struct ConnectTarget {
    scheme: &'static str,
    host: String,
    port: Option<u16>,
    path: String,
    /// Pre-encoded `&key=value` pairs appended to every dial
    user_query: String,
    headers: HeaderMap,
}

impl ConnectTarget {
    /// Parse a user supplied url and normalize it to a websocket target.
    /// `http(s)` schemes are mapped to their websocket equivalent and the
    /// engine.io path is defaulted when the url has none.
    pub(crate) fn parse(
        url: &str,
        query: &[(String, String)],
        headers: HeaderMap,
        config: &EngineConfig,
    ) -> Result<Self, Error> {
        let url = url::Url::parse(url)?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            s => return Err(Error::InvalidUrlScheme(s.to_string())),
        };
        // A tls-enabled build always dials over tls
        let scheme = if cfg!(feature = "tls") { "wss" } else { scheme };

        // `Url` keeps ipv6 hosts bracketed, which is exactly the form
        // the websocket handshake needs
        let host = url
            .host_str()
            .ok_or(Error::InvalidUrlScheme(url.scheme().to_string()))?
            .to_string();
        let path = match url.path() {
            "" | "/" => config.req_path.clone(),
            p => p.to_string(),
        };

        let mut user_query = String::new();
        for (key, value) in query {
            user_query.push('&');
            user_query.push_str(key);
            user_query.push('=');
            user_query.push_str(&encode_query_value(value));
        }

        Ok(Self {
            scheme,
            host,
            port: url.port(),
            path,
            user_query,
            headers,
        })
    }

    /// Compose the url for one dial: the protocol params, the session id
    /// when reconnecting, a cache-busting timestamp and the user query.
    pub(crate) fn build_url(&self, sid: Option<&str>) -> String {
        use std::fmt::Write;
        let mut url = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            write!(url, ":{port}").unwrap();
        }
        url.push_str(&self.path);
        url.push_str("?EIO=4&transport=websocket");
        if let Some(sid) = sid {
            write!(url, "&sid={sid}").unwrap();
        }
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        write!(url, "&t={t}").unwrap();
        url.push_str(&self.user_query);
        url
    }

    /// Open a websocket connection to the target, applying the handshake
    /// headers and the proxy authorization if any.
    pub(crate) async fn connect(
        &self,
        sid: Option<&str>,
        config: &EngineConfig,
    ) -> Result<WsStream, Error> {
        let url = self.build_url(sid);
        let mut request = url
            .into_client_request()
            .map_err(|e| Error::WsTransport(Box::new(e)))?;
        for (key, value) in &self.headers {
            request.headers_mut().insert(key.clone(), value.clone());
        }
        if let Some(proxy) = &config.proxy {
            let credentials =
                general_purpose::STANDARD.encode(format!("{}:{}", proxy.username, proxy.password));
            request.headers_mut().insert(
                http::header::PROXY_AUTHORIZATION,
                format!("Basic {credentials}").parse()?,
            );
        }
        let (ws, _res) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::WsTransport(Box::new(e)))?;
        Ok(ws)
    }
}

/// Percent-encode a query value: every byte outside `[A-Za-z0-9]` is
/// escaped as uppercase `%HH`.
fn encode_query_value(value: &str) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(value.len());
    for &b in value.as_bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' => out.push(b as char),
            _ => write!(out, "%{b:02X}").unwrap(),
        }
    }
    out
}

/// Forwards all packets waiting to be sent to the websocket
///
/// The websocket stream is flushed only when the internal channel is drained
pub(crate) fn forward_to_transport(
    mut tx: SplitSink<WsStream, Message>,
    mut rx: mpsc::Receiver<PacketBuf>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // map a packet to a websocket message
        // It is declared as a macro rather than a closure to avoid ownership issues
        macro_rules! map_fn {
            ($item:ident) => {
                let res = match $item {
                    Packet::Binary(bin) => tx.feed(Message::Binary(bin)).await,
                    Packet::Close => {
                        tx.send(Message::Close(None)).await.ok();
                        rx.close();
                        break;
                    }
                    _ => {
                        let packet: String = $item.into();
                        tx.feed(Message::Text(packet.into())).await
                    }
                };
                if let Err(_e) = res {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("error sending packet: {}", _e);
                }
            };
        }

        while let Some(items) = rx.recv().await {
            for item in items {
                map_fn!(item);
            }
            // For every available packet we continue to send until the channel is drained
            while let Ok(items) = rx.try_recv() {
                for item in items {
                    map_fn!(item);
                }
            }

            tx.flush().await.ok();
        }
    })
}
