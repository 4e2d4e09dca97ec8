//! Parse and serialize from and into the socket.io common packet format.
//!
//! The wire form of a packet is:
//! ```text
//! <packet type>[<# of binary attachments>-][<namespace>,][<acknowledgment id>][JSON-stringified payload without binary]
//! + binary attachments extracted
//! ```
//!
//! The parser is stateful: the binary attachments of an event arrive as
//! separate frames after the textual header, so a partial packet is kept
//! in the [`ParserState`] until the expected count is reached.

use std::sync::Mutex;

use bytes::Bytes;
use engineioxide_client::Str;

use crate::packet::{Packet, PacketData};

mod de;
mod ser;

/// Errors when parsing socket.io packets.
///
/// None of them is fatal: a malformed frame is dropped and the session
/// continues, so the server can recover by resending.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Invalid packet type
    #[error("invalid packet type")]
    InvalidPacketType,

    /// Invalid attachments count
    #[error("invalid attachments")]
    InvalidAttachments,

    /// The json payload could not be parsed
    #[error("invalid json payload: {0}")]
    InvalidData(#[from] serde_json::Error),

    /// Received binary data without a pending binary packet
    #[error("received unexpected binary data")]
    UnexpectedBinaryPacket,

    /// Needs more binary data before deserialization. It is not exactly an
    /// error, it is used for control flow: the partial packet is kept and
    /// the caller should feed the next binary frame.
    #[error("needs more binary data before deserialization")]
    NeedsMoreBinaryData,
}

/// A textual header waiting for its binary attachments
#[derive(Debug)]
pub(crate) struct PartialPacket {
    ns: Str,
    ack: Option<i64>,
    /// binary_ack (`6`) when true, binary_event (`5`) otherwise
    is_ack: bool,
    /// The json body held verbatim until the attachments are complete
    body: Str,
    expected: usize,
    bins: Vec<Bytes>,
}

/// The decoding state of one engine.io session
#[derive(Debug, Default)]
pub struct ParserState {
    partial: Mutex<Option<PartialPacket>>,
}

/// Parse and serialize socket.io packets in the common (json) format
#[derive(Debug, Default, Clone, Copy)]
pub struct Parser;

impl Parser {
    /// Encode a packet into its textual form and its extracted binary
    /// attachments. Events and acks with binary leaves are promoted to
    /// their binary counterpart.
    pub fn encode(self, packet: Packet) -> (Str, Vec<Bytes>) {
        ser::serialize_packet(packet)
    }

    /// Parse a textual frame. Any pending partial packet is discarded
    /// first. If the header announces binary attachments the partial
    /// packet is stored and [`ParseError::NeedsMoreBinaryData`] is
    /// returned.
    pub fn decode_str(self, state: &ParserState, data: Str) -> Result<Packet, ParseError> {
        // A text frame received while attachments were expected aborts
        // the reassembly
        state.partial.lock().unwrap().take();

        let header = de::deserialize_header(data)?;
        let ns = header.ns.clone();
        let inner = match header.index {
            b'0' => PacketData::Connect(if header.body.is_empty() {
                None
            } else {
                Some(de::deserialize_body(&header.body, &[])?)
            }),
            b'1' => PacketData::Disconnect,
            b'2' => PacketData::Event(de::deserialize_body(&header.body, &[])?, header.ack),
            b'3' => PacketData::EventAck(
                de::deserialize_body(&header.body, &[])?,
                header.ack.ok_or(ParseError::InvalidPacketType)?,
            ),
            b'4' => PacketData::ConnectError(de::deserialize_body(&header.body, &[])?),
            b'5' | b'6' => {
                let expected = header.attachments.ok_or(ParseError::InvalidAttachments)?;
                let partial = PartialPacket {
                    ns,
                    ack: header.ack,
                    is_ack: header.index == b'6',
                    body: header.body,
                    expected,
                    bins: Vec::with_capacity(expected),
                };
                if expected == 0 {
                    return finish_binary(partial);
                }
                *state.partial.lock().unwrap() = Some(partial);
                return Err(ParseError::NeedsMoreBinaryData);
            }
            _ => return Err(ParseError::InvalidPacketType),
        };
        Ok(Packet { inner, ns })
    }

    /// Feed a binary frame into the pending partial packet. Emits the
    /// reassembled packet once the last expected attachment arrived.
    pub fn decode_bin(self, state: &ParserState, data: Bytes) -> Result<Packet, ParseError> {
        let mut guard = state.partial.lock().unwrap();
        let partial = guard.as_mut().ok_or(ParseError::UnexpectedBinaryPacket)?;
        partial.bins.push(data);
        if partial.bins.len() < partial.expected {
            return Err(ParseError::NeedsMoreBinaryData);
        }
        let partial = guard.take().unwrap();
        drop(guard);
        finish_binary(partial)
    }
}

fn finish_binary(partial: PartialPacket) -> Result<Packet, ParseError> {
    let value = de::deserialize_body(&partial.body, &partial.bins)?;
    let inner = match (partial.is_ack, partial.ack) {
        (true, Some(ack)) => PacketData::BinaryAck(value, ack),
        (true, None) => return Err(ParseError::InvalidPacketType),
        (false, ack) => PacketData::BinaryEvent(value, ack),
    };
    Ok(Packet {
        inner,
        ns: partial.ns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn encode(packet: Packet) -> String {
        Parser.encode(packet).0.into()
    }
    fn decode(value: &str) -> Packet {
        Parser
            .decode_str(&Default::default(), value.to_string().into())
            .unwrap()
    }
    fn event_value(event: &str, args: Vec<Value>) -> Value {
        crate::value::event_payload(event, args)
    }

    #[test]
    fn packet_encode_connect() {
        assert_eq!(encode(Packet::connect("/", None)), "0");
        let auth: Value = [("token".to_string(), Value::from("x"))].into_iter().collect();
        assert_eq!(
            encode(Packet::connect("/admin", Some(auth))),
            "0/admin,{\"token\":\"x\"}"
        );
    }

    #[test]
    fn packet_decode_connect() {
        let packet = decode("0{\"sid\":\"abc\"}");
        let payload: Value = [("sid".to_string(), Value::from("abc"))].into_iter().collect();
        assert_eq!(packet, Packet::connect("/", Some(payload.clone())));

        let packet = decode("0/admin,{\"sid\":\"abc\"}");
        assert_eq!(packet, Packet::connect("/admin", Some(payload)));
    }

    #[test]
    fn packet_encode_disconnect() {
        assert_eq!(encode(Packet::disconnect("/")), "1");
        assert_eq!(encode(Packet::disconnect("/admin")), "1/admin,");
    }

    #[test]
    fn packet_decode_disconnect() {
        assert_eq!(decode("1"), Packet::disconnect("/"));
        assert_eq!(decode("1/admin,"), Packet::disconnect("/admin"));
        // some implementations do not close the namespace with a comma
        assert_eq!(decode("1/admin"), Packet::disconnect("/admin"));
    }

    #[test]
    fn packet_encode_event() {
        let payload = event_value("chat", vec![Value::from("hello"), Value::from(42)]);
        assert_eq!(
            encode(Packet::event("/", payload.clone())),
            "2[\"chat\",\"hello\",42]"
        );

        // Encode with ack id
        let mut packet = Packet::event("/", payload.clone());
        packet.inner.set_ack_id(17);
        assert_eq!(encode(packet), "217[\"chat\",\"hello\",42]");

        // Encode with ns
        assert_eq!(
            encode(Packet::event("/admin", payload.clone())),
            "2/admin,[\"chat\",\"hello\",42]"
        );

        // Encode with ns and ack id
        let mut packet = Packet::event("/admin", payload);
        packet.inner.set_ack_id(17);
        assert_eq!(encode(packet), "2/admin,17[\"chat\",\"hello\",42]");
    }

    #[test]
    fn packet_decode_event() {
        let payload = event_value("chat", vec![Value::from("hello"), Value::from(42)]);
        assert_eq!(
            decode("2[\"chat\",\"hello\",42]"),
            Packet::event("/", payload.clone())
        );

        let mut expected = Packet::event("/", payload.clone());
        expected.inner.set_ack_id(1);
        assert_eq!(decode("21[\"chat\",\"hello\",42]"), expected);

        assert_eq!(
            decode("2/admin,[\"chat\",\"hello\",42]"),
            Packet::event("/admin", payload.clone())
        );

        let mut expected = Packet::event("/admin", payload);
        expected.inner.set_ack_id(17);
        assert_eq!(decode("2/admin,17[\"chat\",\"hello\",42]"), expected);
    }

    #[test]
    fn packet_encode_event_ack() {
        let payload = Value::Array(vec![Value::from("pong")]);
        assert_eq!(encode(Packet::ack("/", payload.clone(), 54)), "354[\"pong\"]");
        assert_eq!(
            encode(Packet::ack("/admin", payload, 17)),
            "3/admin,17[\"pong\"]"
        );
    }

    #[test]
    fn packet_decode_event_ack() {
        let payload = Value::Array(vec![Value::from("pong")]);
        assert_eq!(decode("354[\"pong\"]"), Packet::ack("/", payload.clone(), 54));
        assert_eq!(
            decode("3/admin,17[\"pong\"]"),
            Packet::ack("/admin", payload, 17)
        );
    }

    #[test]
    fn packet_decode_ack_without_id_is_rejected() {
        let err = Parser
            .decode_str(&Default::default(), "3[\"pong\"]".to_string().into())
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidPacketType));
    }

    #[test]
    fn packet_decode_connect_error() {
        let packet = decode("4{\"message\":\"Invalid namespace\"}");
        let payload: Value = [("message".to_string(), Value::from("Invalid namespace"))]
            .into_iter()
            .collect();
        assert_eq!(
            packet,
            Packet {
                inner: PacketData::ConnectError(payload),
                ns: "/".into()
            }
        );
    }

    #[test]
    fn packet_encode_binary_event() {
        use bytes::Bytes;
        let payload = event_value(
            "upload",
            vec![[(
                "file".to_string(),
                Value::Binary(Bytes::from_static(&[1, 2, 3])),
            )]
            .into_iter()
            .collect()],
        );
        let (text, bins) = Parser.encode(Packet::event("/", payload));
        assert_eq!(
            text,
            "51-[\"upload\",{\"file\":{\"_placeholder\":true,\"num\":0}}]"
        );
        assert_eq!(bins, vec![Bytes::from_static(&[1, 2, 3])]);
    }

    #[test]
    fn packet_decode_binary_event() {
        use bytes::Bytes;
        let state = ParserState::default();
        let text = "51-[\"upload\",{\"file\":{\"_placeholder\":true,\"num\":0}}]";
        assert!(matches!(
            Parser.decode_str(&state, text.to_string().into()),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        let packet = Parser
            .decode_bin(&state, Bytes::from_static(&[1, 2, 3]))
            .unwrap();

        let payload = event_value(
            "upload",
            vec![[(
                "file".to_string(),
                Value::Binary(Bytes::from_static(&[1, 2, 3])),
            )]
            .into_iter()
            .collect()],
        );
        assert_eq!(
            packet,
            Packet {
                inner: PacketData::BinaryEvent(payload, None),
                ns: "/".into()
            }
        );
    }

    #[test]
    fn packet_decode_binary_ack_with_ns_and_id() {
        use bytes::Bytes;
        let state = ParserState::default();
        assert!(matches!(
            Parser.decode_str(
                &state,
                "61-/admin,54[{\"_placeholder\":true,\"num\":0}]".to_string().into()
            ),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        let packet = Parser.decode_bin(&state, Bytes::from_static(&[9])).unwrap();
        assert_eq!(
            packet,
            Packet {
                inner: PacketData::BinaryAck(
                    Value::Array(vec![Value::Binary(Bytes::from_static(&[9]))]),
                    54
                ),
                ns: "/admin".into()
            }
        );
    }

    #[test]
    fn packet_decode_out_of_range_placeholder_yields_null() {
        use bytes::Bytes;
        let state = ParserState::default();
        assert!(matches!(
            Parser.decode_str(
                &state,
                "51-[\"ev\",{\"_placeholder\":true,\"num\":7}]".to_string().into()
            ),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        let packet = Parser.decode_bin(&state, Bytes::from_static(&[1])).unwrap();
        assert_eq!(
            packet,
            Packet {
                inner: PacketData::BinaryEvent(
                    Value::Array(vec![Value::Str("ev".into()), Value::Null]),
                    None
                ),
                ns: "/".into()
            }
        );
    }

    #[test]
    fn text_frame_discards_pending_partial() {
        let state = ParserState::default();
        assert!(matches!(
            Parser.decode_str(&state, "51-[\"ev\",{\"_placeholder\":true,\"num\":0}]".to_string().into()),
            Err(ParseError::NeedsMoreBinaryData)
        ));
        // a text frame arrives before the announced attachment
        let packet = Parser
            .decode_str(&state, "2[\"other\"]".to_string().into())
            .unwrap();
        assert_eq!(
            packet,
            Packet::event("/", Value::Array(vec![Value::Str("other".into())]))
        );
        // the partial was dropped: binary data is now unexpected
        assert!(matches!(
            Parser.decode_bin(&state, bytes::Bytes::from_static(&[1])),
            Err(ParseError::UnexpectedBinaryPacket)
        ));
    }

    #[test]
    fn packet_reject_invalid_binary_event() {
        let err = Parser
            .decode_str(&Default::default(), "5invalid".to_string().into())
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidAttachments));
    }

    #[test]
    fn packet_reject_malformed_json() {
        let err = Parser
            .decode_str(&Default::default(), "2[\"chat\"".to_string().into())
            .unwrap_err();
        assert!(matches!(err, ParseError::InvalidData(_)));
    }

    #[test]
    fn packet_reject_empty_or_unknown_type() {
        assert!(matches!(
            Parser.decode_str(&Default::default(), "".to_string().into()),
            Err(ParseError::InvalidPacketType)
        ));
        assert!(matches!(
            Parser.decode_str(&Default::default(), "7azdaz".to_string().into()),
            Err(ParseError::InvalidPacketType)
        ));
    }

    #[test]
    fn float_round_trip() {
        let payload = event_value("m", vec![Value::Float(3.141592653589793)]);
        let encoded = encode(Packet::event("/", payload.clone()));
        assert_eq!(decode(&encoded), Packet::event("/", payload));
    }
}
