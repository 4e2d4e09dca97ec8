use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Str;

/// A Packet type to use when receiving and sending data to the server
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Open packet sent by the server to initiate the session
    Open(OpenPacket),
    /// Close packet used to close the session
    Close,
    /// Ping packet used to check if the session is still alive.
    /// The client never sends this packet, it is only sent by the server
    Ping,
    /// Pong packet used to respond to a Ping packet.
    /// The server never sends this packet, it is only sent by the client
    Pong,
    /// Message packet used to carry a socket.io packet
    Message(Str),
    /// Upgrade packet, only meaningful for polling transports
    Upgrade,
    /// Noop packet, only meaningful for polling transports
    Noop,

    /// Binary packet mapped to a websocket binary frame.
    /// Not part of the textual protocol, used internally
    Binary(Bytes),
}

/// An error that occurs when parsing an engine.io frame.
#[derive(Debug, thiserror::Error)]
pub enum PacketParseError {
    /// The open packet payload could not be parsed
    #[error("invalid open packet: {0}")]
    InvalidOpenPacket(#[from] serde_json::Error),
    /// The frame digit is invalid
    #[error("invalid packet type: {0:?}")]
    InvalidPacketType(Option<char>),
}

impl Packet {
    /// Check if the packet is a binary packet
    pub fn is_binary(&self) -> bool {
        matches!(self, Packet::Binary(_))
    }

    /// Get the max size the packet could have when serialized
    pub fn get_size_hint(&self) -> usize {
        match self {
            Packet::Open(_) => 156,
            Packet::Close => 1,
            Packet::Ping => 1,
            Packet::Pong => 1,
            Packet::Message(msg) => 1 + msg.len(),
            Packet::Upgrade => 1,
            Packet::Noop => 1,
            Packet::Binary(data) => data.len(),
        }
    }
}

/// Serialize a [`Packet`] to a [`String`] according to the Engine.IO protocol
impl From<Packet> for String {
    fn from(packet: Packet) -> String {
        let len = packet.get_size_hint();
        let mut buffer = String::with_capacity(len);
        match packet {
            Packet::Open(open) => {
                buffer.push('0');
                buffer.push_str(&serde_json::to_string(&open).unwrap());
            }
            Packet::Close => buffer.push('1'),
            Packet::Ping => buffer.push('2'),
            Packet::Pong => buffer.push('3'),
            Packet::Message(msg) => {
                buffer.push('4');
                buffer.push_str(&msg);
            }
            Packet::Upgrade => buffer.push('5'),
            Packet::Noop => buffer.push('6'),
            Packet::Binary(_) => panic!("binary packets are sent as websocket binary frames"),
        };
        buffer
    }
}

/// Deserialize a [`Packet`] from a [`Str`] according to the Engine.IO protocol
impl TryFrom<Str> for Packet {
    type Error = PacketParseError;
    fn try_from(value: Str) -> Result<Self, Self::Error> {
        let packet_type = value
            .as_bytes()
            .first()
            .ok_or(PacketParseError::InvalidPacketType(None))?;
        let res = match packet_type {
            b'0' => Packet::Open(serde_json::from_str(value.slice(1..).as_str())?),
            b'1' => Packet::Close,
            b'2' => Packet::Ping,
            b'3' => Packet::Pong,
            b'4' => Packet::Message(value.slice(1..)),
            b'5' => Packet::Upgrade,
            b'6' => Packet::Noop,
            c => Err(PacketParseError::InvalidPacketType(Some(*c as char)))?,
        };
        Ok(res)
    }
}

impl TryFrom<String> for Packet {
    type Error = PacketParseError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Packet::try_from(Str::from(value))
    }
}

/// An OpenPacket is sent by the server in response to the websocket handshake.
/// It carries the session id and the heartbeat parameters.
///
/// Servers omitting the heartbeat fields get the protocol defaults
/// (25s interval / 60s timeout).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenPacket {
    /// The session ID, echoed back as the `sid` query param on reconnection
    pub sid: String,
    /// The ping interval, used in the heartbeat mechanism (in milliseconds)
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// The ping timeout, used in the heartbeat mechanism (in milliseconds)
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25000
}
fn default_ping_timeout() -> u64 {
    60000
}

impl OpenPacket {
    /// The whole heartbeat budget: a server ping is expected at least every
    /// `ping_interval + ping_timeout` milliseconds.
    pub fn heartbeat_deadline(&self) -> std::time::Duration {
        let interval = if self.ping_interval == 0 {
            default_ping_interval()
        } else {
            self.ping_interval
        };
        let timeout = if self.ping_timeout == 0 {
            default_ping_timeout()
        } else {
            self.ping_timeout
        };
        std::time::Duration::from_millis(interval + timeout)
    }
}
