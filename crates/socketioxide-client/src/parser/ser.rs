use bytes::Bytes;
use engineioxide_client::Str;

use crate::packet::{Packet, PacketData};
use crate::value::Value;

/// Serialize a packet to its textual header plus extracted binary
/// attachments, in the order: type digit, attachment count, namespace,
/// ack id, json body.
pub(super) fn serialize_packet(packet: Packet) -> (Str, Vec<Bytes>) {
    let mut bins: Vec<Bytes> = Vec::new();
    let (index, ack, body) = match packet.inner {
        PacketData::Connect(Some(ref value)) => {
            // binary cannot ride a connect payload, leaves become null
            let json = serialize_value(value, &mut None);
            (0, None, Some(json))
        }
        PacketData::Connect(None) => (0, None, None),
        PacketData::Disconnect => (1, None, None),
        PacketData::Event(ref value, ack) | PacketData::BinaryEvent(ref value, ack) => {
            let json = serialize_value(value, &mut Some(&mut bins));
            (if bins.is_empty() { 2 } else { 5 }, ack, Some(json))
        }
        PacketData::EventAck(ref value, ack) | PacketData::BinaryAck(ref value, ack) => {
            let json = serialize_value(value, &mut Some(&mut bins));
            (if bins.is_empty() { 3 } else { 6 }, Some(ack), Some(json))
        }
        PacketData::ConnectError(ref value) => {
            let json = serialize_value(value, &mut None);
            (4, None, Some(json))
        }
    };

    let body = body.map(|json| json.to_string());
    let mut itoa_buf = itoa::Buffer::new();
    let mut buffer = String::with_capacity(
        1 + packet.ns.len() + 2 + body.as_deref().map(str::len).unwrap_or(0) + 8,
    );
    buffer.push(char::from_digit(index, 10).unwrap());
    if index == 5 || index == 6 {
        buffer.push_str(itoa_buf.format(bins.len()));
        buffer.push('-');
    }
    serialize_nsp(&mut buffer, &packet.ns);
    if let Some(ack) = ack {
        buffer.push_str(itoa_buf.format(ack));
    }
    if let Some(body) = body {
        buffer.push_str(&body);
    }
    (Str::from(buffer), bins)
}

fn serialize_nsp(buffer: &mut String, nsp: &str) {
    if !nsp.is_empty() && nsp != "/" {
        if !nsp.starts_with('/') {
            buffer.push('/');
        }
        buffer.push_str(nsp);
        buffer.push(',');
    }
}

/// Convert a [`Value`] tree to json, side-effect-collecting every binary
/// leaf into `bins` and substituting a placeholder object. Without a
/// collector, binary leaves degrade to null.
fn serialize_value(value: &Value, bins: &mut Option<&mut Vec<Bytes>>) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Binary(data) => match bins {
            Some(bins) => {
                let num = bins.len();
                bins.push(data.clone());
                serde_json::json!({ "_placeholder": true, "num": num })
            }
            None => serde_json::Value::Null,
        },
        Value::Array(values) => serde_json::Value::Array(
            values.iter().map(|v| serialize_value(v, bins)).collect(),
        ),
        Value::Object(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), serialize_value(v, bins)))
                .collect(),
        ),
    }
}
