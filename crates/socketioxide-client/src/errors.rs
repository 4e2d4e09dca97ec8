pub use crate::parser::ParseError;
pub use engineioxide_client::{ConnectionError, DisconnectReason, Error as EngineError};

/// Error type for ack operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AckError {
    /// The ack response timed out
    #[error("ack timeout error")]
    Timeout,

    /// The socket was closed before the ack response arrived
    #[error("socket closed before the ack response arrived")]
    Closed,
}

impl From<tokio::time::error::Elapsed> for AckError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}
