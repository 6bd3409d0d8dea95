// ABOUTME: Content hasher producing stable SHA-256 digests of canonicalized payloads.
// ABOUTME: Equal payloads hash equally regardless of mapping key insertion order.

use sha2::{Digest, Sha256};

use crate::payload::{Payload, PayloadError, Scalar};

/// Compute the content hash of a payload as lowercase hex SHA-256.
///
/// The input is the payload's canonical CBOR encoding. Mapping keys are
/// already sorted by the payload representation. Non-finite floats are
/// rejected because NaN is not equal to itself and would defeat dedup.
pub fn content_hash(payload: &Payload) -> Result<String, PayloadError> {
    ensure_canonical(payload)?;
    let bytes = payload.to_cbor()?;
    Ok(sha256_hex(&bytes))
}

/// Hex SHA-256 of raw bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn ensure_canonical(payload: &Payload) -> Result<(), PayloadError> {
    match payload {
        Payload::Mapping(map) => map.values().try_for_each(ensure_canonical),
        Payload::Sequence(items) => items.iter().try_for_each(ensure_canonical),
        Payload::Scalar(Scalar::Float(f)) if !f.is_finite() => Err(PayloadError::Unsupported(
            format!("non-finite float {f} cannot be canonicalized"),
        )),
        Payload::Scalar(_) | Payload::Bytes(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn p(value: serde_json::Value) -> Payload {
        Payload::try_from(value).unwrap()
    }

    #[test]
    fn hash_ignores_key_insertion_order() {
        let mut first = BTreeMap::new();
        first.insert("zeta".to_string(), Payload::from(1));
        first.insert("alpha".to_string(), Payload::from("x"));

        let mut second = BTreeMap::new();
        second.insert("alpha".to_string(), Payload::from("x"));
        second.insert("zeta".to_string(), Payload::from(1));

        let a = content_hash(&Payload::Mapping(first)).unwrap();
        let b = content_hash(&Payload::Mapping(second)).unwrap();
        assert_eq!(a, b);

        let from_json = content_hash(&p(json!({"zeta": 1, "alpha": "x"}))).unwrap();
        assert_eq!(a, from_json);
    }

    #[test]
    fn hash_is_256_bit_hex() {
        let digest = content_hash(&p(json!({"a": 1}))).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_payloads_hash_differently() {
        let a = content_hash(&p(json!({"a": 1}))).unwrap();
        let b = content_hash(&p(json!({"a": 2}))).unwrap();
        let c = content_hash(&p(json!([1]))).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn nan_is_unsupported() {
        let payload = Payload::Sequence(vec![Payload::Scalar(Scalar::Float(f64::NAN))]);
        let err = content_hash(&payload).unwrap_err();
        assert!(matches!(err, PayloadError::Unsupported(_)));
    }
}
