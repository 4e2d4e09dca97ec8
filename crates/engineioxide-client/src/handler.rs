//! ## An [`EngineHandler`] to get event calls from the connection engine
//!
//! The upper protocol layer implements this trait to receive transport
//! callbacks. All callbacks are invoked from the engine supervisor task,
//! serially and in receive order; implementations must not block.

use bytes::Bytes;

use crate::engine::{ConnectionState, DisconnectReason};
use crate::errors::ConnectionError;
use crate::str::Str;

/// The [`EngineHandler`] trait can be implemented on any struct to handle
/// engine.io session events.
pub trait EngineHandler: Send + Sync + 'static {
    /// Called when the engine.io handshake completed (OPEN frame received)
    fn on_open(&self);

    /// Called when a message packet is received from the server
    fn on_message(&self, msg: Str);

    /// Called when a binary packet is received from the server
    fn on_binary(&self, data: Bytes);

    /// Called when the current session is lost.
    /// The engine may still reconnect afterwards; [`EngineHandler::on_close`]
    /// tells when it will not.
    fn on_disconnect(&self);

    /// Called exactly once per connection lifetime, when the engine gives
    /// up for good with the final [`DisconnectReason`]
    fn on_close(&self, reason: DisconnectReason);

    /// Called when a connection could not be established and no retry
    /// will be made
    fn on_fail(&self, error: ConnectionError);

    /// Called when the engine starts waiting before a reconnection attempt
    fn on_reconnecting(&self) {}

    /// Called when a reconnection attempt is about to be made, with the
    /// attempt number and the delay that was waited (in milliseconds)
    fn on_reconnect(&self, _attempt: u32, _delay_ms: u64) {}

    /// Called on every connection state transition
    fn on_state(&self, _state: ConnectionState) {}
}
