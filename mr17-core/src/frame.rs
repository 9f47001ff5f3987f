//! Frame codec for the gateway wire format
//!
//! One frame per line:
//!
//! ```text
//! {"id": <int>, "data": {<field>: <number|string>, ...}, "chksum": <int>}
//! ```
//!
//! Decoding checks the payload first, then the checksum, then the id. The
//! checksum has to establish payload integrity before the id is trusted for
//! routing.

use crate::error::DecodeError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// A single payload value as sent by the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; text is not coerced
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Text(_) => None,
        }
    }

    /// Integer view of the value; floats only when they carry no fraction
    /// and fit in an i64
    pub fn as_i64(&self) -> Option<i64> {
        // 2^63 itself is out of range, -2^63 is not
        const LIMIT: f64 = 9_223_372_036_854_775_808.0;
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(f) => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Int(i)),
                // u64 beyond i64 range and every non-integer end up here
                None => n.as_f64().map(FieldValue::Float),
            },
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Ordered field map of one frame.
///
/// Keys are unique. Inserting an existing key replaces its value in place, so
/// the first occurrence decides the position.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Payload(Vec<(String, FieldValue)>);

impl Payload {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        let key = key.into();
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Payload {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut payload = Payload::new();
        for (k, v) in iter {
            payload.insert(k, v);
        }
        payload
    }
}

/// One decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub id: i64,
    pub data: Payload,
    pub chksum: i64,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame id={} fields={} chksum={}",
            self.id,
            self.data.len(),
            self.chksum
        )
    }
}

/// Decode one raw line from the link
pub fn decode(line: &[u8]) -> Result<Frame, DecodeError> {
    let text = std::str::from_utf8(line)
        .map_err(|e| DecodeError::MalformedJson(e.to_string()))?
        .trim();

    let root: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::MalformedJson(e.to_string()))?;
    let object = root
        .as_object()
        .ok_or_else(|| DecodeError::MalformedJson("frame is not a JSON object".to_string()))?;

    let data = object
        .get("data")
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingPayload)?;

    let chksum = object
        .get("chksum")
        .and_then(Value::as_i64)
        .ok_or(DecodeError::MissingChecksum)?;

    let id = object
        .get("id")
        .and_then(Value::as_i64)
        .ok_or(DecodeError::MissingId)?;

    let mut payload = Payload::new();
    for (key, value) in data {
        let value = FieldValue::from_json(value).ok_or_else(|| {
            DecodeError::MalformedJson(format!("field `{}` is not a number or string", key))
        })?;
        payload.insert(key.as_str(), value);
    }

    Ok(Frame {
        id,
        data: payload,
        chksum,
    })
}
