// ABOUTME: Closed sum type for the schema-free structured data that snapvault versions.
// ABOUTME: Provides lossless serde support plus conversions to and from serde_json values.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors raised when a value cannot be represented as a payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unsupported payload: {0}")]
    Unsupported(String),

    #[error("payload encoding failed: {0}")]
    Encode(String),

    #[error("payload decoding failed: {0}")]
    Decode(String),
}

/// A leaf value inside a payload.
///
/// Floats compare by bit pattern, matching their canonical encoding:
/// `0.0` and `-0.0` are different values.
#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Text(a), Scalar::Text(b)) => a == b,
            _ => false,
        }
    }
}

/// A versionable record: nested mappings and sequences over scalars and raw bytes.
///
/// Mapping keys are kept in a `BTreeMap`, so two mappings built with
/// different insertion orders serialize to the same bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Mapping(BTreeMap<String, Payload>),
    Sequence(Vec<Payload>),
    Scalar(Scalar),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn null() -> Self {
        Payload::Scalar(Scalar::Null)
    }

    /// Short name of the payload's shape, used in schema change summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Mapping(_) => "mapping",
            Payload::Sequence(_) => "sequence",
            Payload::Bytes(_) => "bytes",
            Payload::Scalar(Scalar::Null) => "null",
            Payload::Scalar(Scalar::Bool(_)) => "bool",
            Payload::Scalar(Scalar::Int(_)) => "int",
            Payload::Scalar(Scalar::Float(_)) => "float",
            Payload::Scalar(Scalar::Text(_)) => "text",
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, Payload>> {
        match self {
            Payload::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Payload]> {
        match self {
            Payload::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Build a payload from any serializable value by way of its JSON form.
    /// Fails for shapes JSON cannot express, such as maps with non-string keys.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, PayloadError> {
        let json =
            serde_json::to_value(value).map_err(|e| PayloadError::Unsupported(e.to_string()))?;
        Payload::try_from(json)
    }

    /// Render as JSON for display. Bytes become an array of numbers and
    /// non-finite floats become null, so this is not a lossless encoding.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Payload::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Payload::Sequence(items) => Value::Array(items.iter().map(Payload::to_json).collect()),
            Payload::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Payload::Scalar(Scalar::Null) => Value::Null,
            Payload::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Payload::Scalar(Scalar::Int(i)) => Value::from(*i),
            Payload::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Payload::Scalar(Scalar::Text(s)) => Value::String(s.clone()),
        }
    }

    /// Encode as CBOR. This is the format of stored blobs and the hasher input.
    pub fn to_cbor(&self) -> Result<Vec<u8>, PayloadError> {
        to_cbor(self)
    }

    pub fn from_cbor(bytes: &[u8]) -> Result<Self, PayloadError> {
        from_cbor(bytes)
    }
}

/// Encode any serializable value as CBOR.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, PayloadError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| PayloadError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a CBOR-encoded value.
pub fn from_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, PayloadError> {
    ciborium::from_reader(bytes).map_err(|e| PayloadError::Decode(e.to_string()))
}

/// Integers outside the `i64` range are rejected rather than rounded to a float.
impl TryFrom<serde_json::Value> for Payload {
    type Error = PayloadError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;
        Ok(match value {
            Value::Null => Payload::null(),
            Value::Bool(b) => Payload::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Payload::Scalar(Scalar::Int(i)),
                (None, Some(_)) if n.is_u64() => {
                    return Err(PayloadError::Unsupported(format!(
                        "integer {n} does not fit in 64 signed bits"
                    )));
                }
                (None, Some(f)) => Payload::Scalar(Scalar::Float(f)),
                (None, None) => {
                    return Err(PayloadError::Unsupported(format!("unrepresentable number {n}")));
                }
            },
            Value::String(s) => Payload::Scalar(Scalar::Text(s)),
            Value::Array(items) => Payload::Sequence(
                items
                    .into_iter()
                    .map(Payload::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Payload::Mapping(
                map.into_iter()
                    .map(|(k, v)| Ok((k, Payload::try_from(v)?)))
                    .collect::<Result<_, PayloadError>>()?,
            ),
        })
    }
}

impl From<Scalar> for Payload {
    fn from(value: Scalar) -> Self {
        Payload::Scalar(value)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Scalar(Scalar::Int(value))
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Scalar(Scalar::Text(value.to_string()))
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Payload::Mapping(map) => {
                let mut m = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    m.serialize_entry(k, v)?;
                }
                m.end()
            }
            Payload::Sequence(items) => {
                let mut s = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    s.serialize_element(item)?;
                }
                s.end()
            }
            Payload::Bytes(bytes) => serializer.serialize_bytes(bytes),
            Payload::Scalar(Scalar::Null) => serializer.serialize_unit(),
            Payload::Scalar(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Payload::Scalar(Scalar::Int(i)) => serializer.serialize_i64(*i),
            Payload::Scalar(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Payload::Scalar(Scalar::Text(s)) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PayloadVisitor)
    }
}

struct PayloadVisitor;

impl<'de> Visitor<'de> for PayloadVisitor {
    type Value = Payload;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a mapping, sequence, scalar, or byte string")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Payload, E> {
        Ok(Payload::null())
    }

    fn visit_none<E: de::Error>(self) -> Result<Payload, E> {
        Ok(Payload::null())
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Payload, D::Error> {
        Payload::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Payload, E> {
        Ok(Payload::Scalar(Scalar::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Payload, E> {
        Ok(Payload::Scalar(Scalar::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Payload, E> {
        i64::try_from(v)
            .map(|i| Payload::Scalar(Scalar::Int(i)))
            .map_err(|_| E::invalid_value(de::Unexpected::Unsigned(v), &"an integer within i64"))
    }

    fn visit_i128<E: de::Error>(self, v: i128) -> Result<Payload, E> {
        i64::try_from(v)
            .map(|i| Payload::Scalar(Scalar::Int(i)))
            .map_err(|_| E::custom("integer out of i64 range"))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<Payload, E> {
        i64::try_from(v)
            .map(|i| Payload::Scalar(Scalar::Int(i)))
            .map_err(|_| E::custom("integer out of i64 range"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Payload, E> {
        Ok(Payload::Scalar(Scalar::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Payload, E> {
        Ok(Payload::Scalar(Scalar::Text(v.to_string())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Payload, E> {
        Ok(Payload::Scalar(Scalar::Text(v)))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Payload, E> {
        Ok(Payload::Bytes(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Payload, E> {
        Ok(Payload::Bytes(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Payload, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Payload::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Payload, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Payload>()? {
            map.insert(key, value);
        }
        Ok(Payload::Mapping(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(value: serde_json::Value) -> Payload {
        Payload::try_from(value).unwrap()
    }

    #[test]
    fn json_conversion_preserves_shape() {
        let payload = p(json!({"a": 1, "b": [true, null, "x"], "c": 2.5}));
        let map = payload.as_mapping().unwrap();

        assert_eq!(map["a"], Payload::Scalar(Scalar::Int(1)));
        assert_eq!(map["c"], Payload::Scalar(Scalar::Float(2.5)));
        assert_eq!(map["b"].as_sequence().unwrap().len(), 3);
        assert_eq!(payload.to_json(), json!({"a": 1, "b": [true, null, "x"], "c": 2.5}));
    }

    #[test]
    fn cbor_round_trip_keeps_bytes_distinct_from_sequences() {
        let mut map = BTreeMap::new();
        map.insert("raw".to_string(), Payload::Bytes(vec![1, 2, 3]));
        map.insert(
            "list".to_string(),
            Payload::Sequence(vec![Payload::from(1), Payload::from(2)]),
        );
        map.insert("nested".to_string(), p(json!({"k": "v"})));
        let payload = Payload::Mapping(map);

        let bytes = payload.to_cbor().unwrap();
        let decoded = Payload::from_cbor(&bytes).unwrap();

        assert_eq!(decoded, payload);
    }

    #[test]
    fn from_serialize_rejects_non_string_keys() {
        let mut map = std::collections::HashMap::new();
        map.insert((1, 2), "tuple key");

        let err = Payload::from_serialize(&map).unwrap_err();
        assert!(matches!(err, PayloadError::Unsupported(_)));
    }

    #[test]
    fn kind_names_each_shape() {
        assert_eq!(p(json!({})).kind(), "mapping");
        assert_eq!(p(json!([])).kind(), "sequence");
        assert_eq!(Payload::Bytes(vec![]).kind(), "bytes");
        assert_eq!(p(json!("s")).kind(), "text");
        assert_eq!(Payload::null().kind(), "null");
    }

    #[test]
    fn integers_beyond_i64_are_rejected() {
        let err = Payload::try_from(json!(u64::MAX)).unwrap_err();
        assert!(matches!(err, PayloadError::Unsupported(_)), "{err}");

        let nested = Payload::try_from(json!({"ok": 1, "big": [u64::MAX]}));
        assert!(nested.is_err());
        assert_eq!(p(json!(i64::MAX)), Payload::Scalar(Scalar::Int(i64::MAX)));
    }

    #[test]
    fn signed_zeros_are_distinct() {
        let pos = Payload::Scalar(Scalar::Float(0.0));
        let neg = Payload::Scalar(Scalar::Float(-0.0));
        assert_ne!(pos, neg);
        assert_eq!(neg, Payload::Scalar(Scalar::Float(-0.0)));
    }
}
