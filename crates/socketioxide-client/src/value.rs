//! The dynamically typed message tree exchanged with the server.
//!
//! A [`Value`] is what event arguments, acknowledgement payloads and
//! namespace auth are made of. It maps 1:1 to JSON with one extension:
//! the [`Value::Binary`] variant, carried on the wire as a separate
//! binary frame referenced from the JSON through a placeholder object.

use std::collections::BTreeMap;

use bytes::Bytes;

/// A json-like tagged value with a binary variant.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// The null value
    #[default]
    Null,
    /// A boolean
    Bool(bool),
    /// A signed 64-bit integer
    Int(i64),
    /// A double precision float
    Float(f64),
    /// A utf-8 string
    Str(String),
    /// An immutable binary payload, sent as a separate transport frame
    Binary(Bytes),
    /// An ordered sequence of values
    Array(Vec<Value>),
    /// A string-keyed mapping. Key uniqueness is guaranteed,
    /// insertion order is not preserved
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Whether this value is [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean payload, if this is a [`Value::Bool`]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The integer payload, if this is a [`Value::Int`]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// The float payload. An integer is widened to a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// The string payload, if this is a [`Value::Str`]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The binary payload, if this is a [`Value::Binary`]
    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// The elements, if this is a [`Value::Array`]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// The mapping, if this is a [`Value::Object`]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Whether the tree contains at least one [`Value::Binary`] leaf
    pub fn has_binary(&self) -> bool {
        match self {
            Value::Binary(_) => true,
            Value::Array(values) => values.iter().any(Value::has_binary),
            Value::Object(entries) => entries.values().any(Value::has_binary),
            _ => false,
        }
    }

    /// Look up an entry of an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|o| o.get(key))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}
impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(value as i64)
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}
impl From<Bytes> for Value {
    fn from(value: Bytes) -> Self {
        Value::Binary(value)
    }
}
impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(Bytes::from(value))
    }
}
impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}
impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Object(value)
    }
}
impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<T: IntoIterator<Item = (String, V)>>(iter: T) -> Self {
        Value::Object(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Value::Array(iter.into_iter().map(Into::into).collect())
    }
}

/// Build the wire payload of an event: an array whose first element is the
/// event name, followed by the arguments. This is the only bridge between
/// user facing emission and the wire representation.
pub(crate) fn event_payload(event: &str, args: impl IntoIterator<Item = Value>) -> Value {
    let mut payload = vec![Value::Str(event.to_string())];
    payload.extend(args);
    Value::Array(payload)
}

/// Extract an acknowledgement payload as a message list.
/// Anything else than an array is not a valid ack payload.
pub(crate) fn into_message_list(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(values) => Some(values),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_prepends_name() {
        let payload = event_payload("chat", vec![Value::from("hello"), Value::from(42)]);
        assert_eq!(
            payload,
            Value::Array(vec![
                Value::Str("chat".into()),
                Value::Str("hello".into()),
                Value::Int(42)
            ])
        );
    }

    #[test]
    fn has_binary_walks_the_tree() {
        let value: Value = [
            ("file".to_string(), Value::Binary(Bytes::from_static(&[1]))),
            ("name".to_string(), Value::from("data.bin")),
        ]
        .into_iter()
        .collect();
        assert!(value.has_binary());
        assert!(!Value::from("text").has_binary());
        assert!(Value::Array(vec![Value::Null, value]).has_binary());
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::from(2).as_int(), Some(2));
        assert_eq!(Value::from(2).as_float(), Some(2.0));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from("x").as_str(), Some("x"));
        assert!(Value::Null.is_null());
        let obj: Value = [("k".to_string(), Value::from(1))].into_iter().collect();
        assert_eq!(obj.get("k"), Some(&Value::Int(1)));
        assert_eq!(obj.get("missing"), None);
    }
}
