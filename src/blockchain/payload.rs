use serde_json::Value as JsonValue;
use thiserror::Error;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::transaction::Transaction;

/// Errors that can occur while building a payload from untyped data
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Unsupported payload: {0}")]
    Unsupported(String),
}

const TAG_BYTES: u8 = 0x00;
const TAG_TEXT: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_TRANSACTION: u8 = 0x03;
const TAG_RECORD: u8 = 0x04;

/// A scalar stored inside a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bytes(Vec<u8>),
    Text(String),
    Integer(i64),
}

impl Value {
    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Value::Bytes(bytes) => encode_bytes(out, bytes),
            Value::Text(text) => encode_text(out, text),
            Value::Integer(n) => encode_integer(out, *n),
        }
    }

    fn from_json(value: &JsonValue) -> Result<Self, PayloadError> {
        match value {
            JsonValue::String(s) => Ok(Value::Text(s.clone())),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| PayloadError::Unsupported(format!("non-integer number {}", n))),
            JsonValue::Array(items) => bytes_from_json(items).map(Value::Bytes),
            other => Err(PayloadError::Unsupported(format!("{} value", json_kind(other)))),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Value::Text(text) => write!(f, "{}", text),
            Value::Integer(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

/// A mutable record that may be referenced from several places at once.
///
/// Cloning the handle aliases the same entries: a write through any clone is
/// visible to every block that holds the record.
#[derive(Debug, Clone, Default)]
pub struct SharedRecord {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
}

impl SharedRecord {
    pub fn new() -> Self {
        SharedRecord::default()
    }

    /// Sets a field, returning its previous value
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copies the current entries
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether two handles refer to the same record
    pub fn ptr_eq(&self, other: &SharedRecord) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        out.extend_from_slice(&(entries.len() as u64).to_le_bytes());
        for (key, value) in entries.iter() {
            put_len_prefixed(out, key.as_bytes());
            value.encode_into(out);
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SharedRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let entries = iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        SharedRecord {
            entries: Arc::new(RwLock::new(entries)),
        }
    }
}

impl fmt::Display for SharedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.snapshot();
        write!(f, "{{")?;
        for (i, (key, value)) in entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}

/// Data carried by a block
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Vec<u8>),
    Text(String),
    Integer(i64),
    Transaction(Transaction),
    Record(SharedRecord),
}

impl Payload {
    /// Deterministic encoding used for block hashing.
    ///
    /// Each kind is tagged and every variable-length field is prefixed with its
    /// length as a little-endian `u64`, so distinct payloads never collide.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Payload::Bytes(bytes) => encode_bytes(out, bytes),
            Payload::Text(text) => encode_text(out, text),
            Payload::Integer(n) => encode_integer(out, *n),
            Payload::Transaction(tx) => {
                out.push(TAG_TRANSACTION);
                tx.encode_into(out);
            }
            Payload::Record(record) => {
                out.push(TAG_RECORD);
                record.encode_into(out);
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Integer(_) => "integer",
            Payload::Transaction(_) => "transaction",
            Payload::Record(_) => "record",
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Payload::Text(text) => write!(f, "{}", text),
            Payload::Integer(n) => write!(f, "{}", n),
            Payload::Transaction(tx) => write!(f, "{}", tx),
            Payload::Record(record) => write!(f, "{}", record),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for Payload {
    fn from(bytes: &[u8; N]) -> Self {
        Payload::Bytes(bytes.to_vec())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Integer(n)
    }
}

impl From<Transaction> for Payload {
    fn from(tx: Transaction) -> Self {
        Payload::Transaction(tx)
    }
}

impl From<SharedRecord> for Payload {
    fn from(record: SharedRecord) -> Self {
        Payload::Record(record)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Bytes(bytes) => Payload::Bytes(bytes),
            Value::Text(text) => Payload::Text(text),
            Value::Integer(n) => Payload::Integer(n),
        }
    }
}

impl TryFrom<JsonValue> for Payload {
    type Error = PayloadError;

    fn try_from(value: JsonValue) -> Result<Self, Self::Error> {
        match value {
            JsonValue::Object(map) => {
                let mut entries = BTreeMap::new();
                for (key, value) in map.iter() {
                    entries.insert(key.clone(), Value::from_json(value)?);
                }
                Ok(Payload::Record(entries.into_iter().collect()))
            }
            other => Value::from_json(&other).map(Payload::from),
        }
    }
}

fn bytes_from_json(items: &[JsonValue]) -> Result<Vec<u8>, PayloadError> {
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|n| u8::try_from(n).ok())
                .ok_or_else(|| PayloadError::Unsupported(format!("array element {} is not a byte", item)))
        })
        .collect()
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "nested object",
    }
}

fn encode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(TAG_BYTES);
    put_len_prefixed(out, bytes);
}

fn encode_text(out: &mut Vec<u8>, text: &str) {
    out.push(TAG_TEXT);
    put_len_prefixed(out, text.as_bytes());
}

fn encode_integer(out: &mut Vec<u8>, n: i64) {
    out.push(TAG_INTEGER);
    out.extend_from_slice(&n.to_le_bytes());
}

pub(crate) fn put_len_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kinds_do_not_collide() {
        let text = Payload::from("1");
        let bytes = Payload::from(b"1");
        let integer = Payload::from(1i64);

        assert_ne!(text.canonical_bytes(), bytes.canonical_bytes());
        assert_ne!(text.canonical_bytes(), integer.canonical_bytes());
        assert_ne!(bytes.canonical_bytes(), integer.canonical_bytes());
    }

    #[test]
    fn test_length_prefix_separates_fields() {
        let a: SharedRecord = [("ab", "c")].into_iter().collect();
        let b: SharedRecord = [("a", "bc")].into_iter().collect();

        assert_ne!(
            Payload::from(a).canonical_bytes(),
            Payload::from(b).canonical_bytes()
        );
    }

    #[test]
    fn test_record_encoding_is_order_independent() {
        let a = SharedRecord::new();
        a.set("name", "Hi there!");
        a.set("num", 328965i64);

        let b = SharedRecord::new();
        b.set("num", 328965i64);
        b.set("name", "Hi there!");

        assert_eq!(
            Payload::from(a).canonical_bytes(),
            Payload::from(b).canonical_bytes()
        );
    }

    #[test]
    fn test_shared_record_aliases() {
        let record = SharedRecord::new();
        record.set("num", 328965i64);

        let alias = record.clone();
        let before = Payload::from(record.clone()).canonical_bytes();
        alias.set("num", 99999i64);

        assert!(alias.ptr_eq(&record));
        assert_eq!(record.get("num"), Some(Value::Integer(99999)));
        assert_ne!(Payload::from(record).canonical_bytes(), before);
    }

    #[test]
    fn test_payload_from_json() {
        assert!(matches!(Payload::try_from(json!("I am root")), Ok(Payload::Text(_))));
        assert!(matches!(Payload::try_from(json!(12354)), Ok(Payload::Integer(12354))));
        assert!(matches!(Payload::try_from(json!([1, 2, 255])), Ok(Payload::Bytes(_))));

        let record = Payload::try_from(json!({"name": "Hi there!", "num": 328965})).unwrap();
        match record {
            Payload::Record(record) => assert_eq!(record.get("num"), Some(Value::Integer(328965))),
            other => panic!("expected record, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unsupported_json_payloads() {
        for value in [
            json!(null),
            json!(true),
            json!(1.5),
            json!(u64::MAX),
            json!([1, 256]),
            json!(["a"]),
            json!({"nested": {"a": 1}}),
        ] {
            assert!(
                matches!(Payload::try_from(value.clone()), Err(PayloadError::Unsupported(_))),
                "{} should be rejected",
                value
            );
        }
    }
}
