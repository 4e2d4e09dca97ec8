use std::io::Cursor;

use bytes::{Buf, Bytes};
use engineioxide_client::Str;

use crate::parser::ParseError;
use crate::value::Value;

/// A scanned textual header: everything before the json body
#[derive(Debug)]
pub(super) struct RawHeader {
    pub index: u8,
    pub attachments: Option<usize>,
    pub ns: Str,
    pub ack: Option<i64>,
    pub body: Str,
}

pub(super) fn deserialize_header(data: Str) -> Result<RawHeader, ParseError> {
    if data.is_empty() {
        return Err(ParseError::InvalidPacketType);
    }
    // It is possible to parse the header from a byte slice because separators are only ASCII
    let mut reader = Cursor::new(data.as_str());
    let index = reader.get_u8();
    let index = (b'0'..=b'6')
        .contains(&index)
        .then_some(index)
        .ok_or(ParseError::InvalidPacketType)?;

    let attachments: Option<usize> = if index == b'5' || index == b'6' {
        Some(read_attachments(&mut reader).ok_or(ParseError::InvalidAttachments)?)
    } else {
        None
    };

    // Custom nsps will start with a slash
    let ns = if reader.has_remaining().then(|| reader.chunk()[0]) == Some(b'/') {
        read_nsp(&mut reader, &data)
    } else {
        Str::from("/")
    };
    let ack = read_ack(&mut reader);
    let body = data.slice(reader.position() as usize..);

    Ok(RawHeader {
        index,
        attachments,
        ns,
        ack,
        body,
    })
}

/// Parse a json body into a [`Value`] tree, resolving placeholder objects
/// against the given attachments. A placeholder whose index is out of
/// range resolves to [`Value::Null`].
pub(super) fn deserialize_body(body: &Str, bins: &[Bytes]) -> Result<Value, ParseError> {
    let json: serde_json::Value = serde_json::from_str(body.as_str())?;
    Ok(resolve_value(json, bins))
}

fn resolve_value(json: serde_json::Value, bins: &[Bytes]) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(values) => {
            Value::Array(values.into_iter().map(|v| resolve_value(v, bins)).collect())
        }
        serde_json::Value::Object(entries) => {
            if let Some(num) = placeholder_index(&entries) {
                return bins.get(num).cloned().map(Value::Binary).unwrap_or(Value::Null);
            }
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, resolve_value(v, bins)))
                    .collect(),
            )
        }
    }
}

fn placeholder_index(entries: &serde_json::Map<String, serde_json::Value>) -> Option<usize> {
    if entries.get("_placeholder").and_then(serde_json::Value::as_bool) != Some(true) {
        return None;
    }
    entries
        .get("num")
        .and_then(serde_json::Value::as_u64)
        .map(|num| num as usize)
}

fn read_attachments(reader: &mut Cursor<&str>) -> Option<usize> {
    let data = *reader.get_ref();
    let start_index = reader.position() as usize;
    loop {
        match reader.has_remaining().then(|| reader.get_u8()) {
            Some(c) if c.is_ascii_digit() => (),
            Some(b'-') if reader.position() as usize > start_index => {
                break data[start_index..reader.position() as usize - 1]
                    .parse()
                    .ok();
            }
            _ => break None,
        }
    }
}

fn read_nsp(reader: &mut Cursor<&str>, data: &Str) -> Str {
    let start_index = reader.position() as usize;
    loop {
        match reader.has_remaining().then(|| reader.get_u8()) {
            Some(b',') => {
                break data.slice(start_index..reader.position() as usize - 1);
            }
            // It maybe possible depending on clients that ns does not end with a comma
            // if it is the end of the packet
            // e.g `1/custom`
            None => {
                break data.slice(start_index..reader.position() as usize);
            }
            Some(_) => (),
        }
    }
}

fn read_ack(reader: &mut Cursor<&str>) -> Option<i64> {
    let start_index = reader.position() as usize;
    let data = *reader.get_ref();
    loop {
        match reader.has_remaining().then(|| reader.chunk()[0]) {
            Some(c) if c.is_ascii_digit() => reader.advance(1),
            Some(b'[' | b'{') if reader.position() as usize > start_index => {
                break data[start_index..reader.position() as usize].parse().ok();
            }
            _ => break None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(data: &str) -> RawHeader {
        deserialize_header(data.to_string().into()).unwrap()
    }

    #[test]
    fn data_is_empty() {
        let err = deserialize_header("".to_string().into());
        assert!(matches!(err, Err(ParseError::InvalidPacketType)));
    }

    #[test]
    fn invalid_packet_type() {
        let err = deserialize_header("7azdaz".to_string().into());
        assert!(matches!(err, Err(ParseError::InvalidPacketType)));
        let err = deserialize_header("8".to_string().into());
        assert!(matches!(err, Err(ParseError::InvalidPacketType)));
    }

    #[test]
    fn ns_without_comma_end() {
        let h = header("1/custom");
        assert_eq!(h.ns, "/custom");
        assert!(h.body.is_empty());
    }

    #[test]
    fn header_order_attachments_ns_ack() {
        let h = header("51-/admin,254[\"ev\"]");
        assert_eq!(h.index, b'5');
        assert_eq!(h.attachments, Some(1));
        assert_eq!(h.ns, "/admin");
        assert_eq!(h.ack, Some(254));
        assert_eq!(h.body, "[\"ev\"]");
    }

    #[test]
    fn minimal_header() {
        let h = header("2[\"ev\"]");
        assert_eq!(h.index, b'2');
        assert_eq!(h.attachments, None);
        assert_eq!(h.ns, "/");
        assert_eq!(h.ack, None);
        assert_eq!(h.body, "[\"ev\"]");
    }

    #[test]
    fn missing_attachments_count() {
        let h = deserialize_header("5[\"ev\"]".to_string().into());
        assert!(matches!(h, Err(ParseError::InvalidAttachments)));
    }

    #[test]
    fn resolve_out_of_range_placeholder() {
        let body: Str = "{\"_placeholder\":true,\"num\":3}".to_string().into();
        let value = deserialize_body(&body, &[Bytes::from_static(&[1])]).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn resolve_nested_placeholders() {
        let body: Str = "[{\"a\":{\"_placeholder\":true,\"num\":1}},{\"_placeholder\":true,\"num\":0}]"
            .to_string()
            .into();
        let bins = [Bytes::from_static(&[1]), Bytes::from_static(&[2])];
        let value = deserialize_body(&body, &bins).unwrap();
        let expected = Value::Array(vec![
            [("a".to_string(), Value::Binary(Bytes::from_static(&[2])))]
                .into_iter()
                .collect(),
            Value::Binary(Bytes::from_static(&[1])),
        ]);
        assert_eq!(value, expected);
    }

    #[test]
    fn ordinary_object_is_not_a_placeholder() {
        let body: Str = "{\"_placeholder\":false,\"num\":0}".to_string().into();
        let value = deserialize_body(&body, &[Bytes::from_static(&[1])]).unwrap();
        assert_eq!(
            value,
            [
                ("_placeholder".to_string(), Value::Bool(false)),
                ("num".to_string(), Value::Int(0)),
            ]
            .into_iter()
            .collect::<Value>()
        );
    }
}
