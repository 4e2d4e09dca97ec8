use tokio_tungstenite::tungstenite;

use crate::packet::PacketParseError;

/// Error type for the engine.io client
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid connection url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid url scheme: {0}")]
    InvalidUrlScheme(String),

    #[error("invalid header: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("error parsing engine.io packet: {0}")]
    Packet(#[from] PacketParseError),

    #[error("websocket transport error: {0}")]
    WsTransport(#[from] Box<tungstenite::Error>),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The kind of failure surfaced to the fail listener when a connection
/// could not be established or was lost for a non-recoverable cause.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The connection or an awaited response timed out
    Timeout,
    /// The network is unreachable or the DNS resolution failed
    NetworkFailure,
    /// The server violated the engine.io protocol
    ProtocolError,
    /// The server rejected the authentication
    AuthenticationFailed,
    /// The websocket handshake failed
    TransportOpenFailed,
    /// A TLS error occurred
    SslError,
    /// Any other error
    Unknown,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ConnectionError::*;
        let str: &'static str = match self {
            Timeout => "connection timed out",
            NetworkFailure => "network unreachable or dns failure",
            ProtocolError => "invalid engine.io protocol",
            AuthenticationFailed => "authentication rejected by the server",
            TransportOpenFailed => "websocket handshake failed",
            SslError => "tls error",
            Unknown => "unknown error",
        };
        f.write_str(str)
    }
}

impl From<&tungstenite::Error> for ConnectionError {
    fn from(err: &tungstenite::Error) -> Self {
        use tungstenite::Error::*;
        match err {
            Io(_) => ConnectionError::NetworkFailure,
            #[cfg(feature = "tls")]
            Tls(_) => ConnectionError::SslError,
            Http(resp)
                if resp.status() == http::StatusCode::UNAUTHORIZED
                    || resp.status() == http::StatusCode::FORBIDDEN =>
            {
                ConnectionError::AuthenticationFailed
            }
            Http(_) | HttpFormat(_) => ConnectionError::TransportOpenFailed,
            Protocol(_) => ConnectionError::ProtocolError,
            _ => ConnectionError::Unknown,
        }
    }
}

impl From<&Error> for ConnectionError {
    fn from(err: &Error) -> Self {
        match err {
            Error::WsTransport(e) => ConnectionError::from(&**e),
            Error::Io(_) => ConnectionError::NetworkFailure,
            Error::Packet(_) => ConnectionError::ProtocolError,
            Error::InvalidUrl(_) | Error::InvalidUrlScheme(_) | Error::InvalidHeader(_) => {
                ConnectionError::TransportOpenFailed
            }
        }
    }
}
