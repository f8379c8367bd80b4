//! Canonical JSON and HMAC-SHA256 signing for outbound webhooks.
//!
//! The request body of every webhook is the event payload serialized as
//! canonical JSON: object keys sorted lexicographically at every depth,
//! no insignificant whitespace. When a subscription has a secret the
//! server adds:
//!
//! ```text
//! X-Webhook-Signature: sha256={hex(HMAC-SHA256(secret, body))}
//! ```
//!
//! Receivers recompute the digest over the raw body bytes they received.

use serde_json::{Map, Value};

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Header carrying the event type name.
pub const EVENT_HEADER: &str = "X-Webhook-Event";

/// Header carrying the subscription id.
pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-Id";

/// Algorithm prefix of the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature header must start with \"sha256=\"")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Canonical JSON
// ---------------------------------------------------------------------------

/// Rebuild `value` with every object's keys inserted in sorted order.
///
/// Sorting is done explicitly so the output does not depend on whether
/// `serde_json` was built with `preserve_order`.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(canonicalize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn canonicalize_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| (k.clone(), canonicalize(v)))
        .collect()
}

/// Serialize `value` as compact canonical JSON.
pub fn canonical_json(value: &Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize(value))
}

/// Serialize an event payload mapping as compact canonical JSON.
pub fn canonical_payload(payload: &Map<String, Value>) -> Result<String, serde_json::Error> {
    serde_json::to_string(&canonicalize_map(payload))
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

/// `hex(HMAC-SHA256(secret, body))`.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
    hex::encode(ring::hmac::sign(&key, body).as_ref())
}

/// Full `X-Webhook-Signature` header value for `body`.
pub fn signature_header(secret: &[u8], body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign(secret, body))
}

/// Verify an `X-Webhook-Signature` header value against `body`.
///
/// The digest comparison is constant-time.
pub fn verify(secret: &[u8], body: &[u8], header_value: &str) -> Result<(), SignatureError> {
    let hex_digest = header_value
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat)?;
    let digest = hex::decode(hex_digest).map_err(|_| SignatureError::InvalidHex)?;
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret);
    ring::hmac::verify(&key, body, &digest)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        assert_eq!(
            canonical_json(&value).unwrap(),
            r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn canonical_payload_ignores_insertion_order() {
        let mut first = Map::new();
        first.insert("user_id".into(), json!(42));
        first.insert("amount".into(), json!("10.00"));
        first.insert("currency".into(), json!("RUB"));

        let mut second = Map::new();
        second.insert("currency".into(), json!("RUB"));
        second.insert("user_id".into(), json!(42));
        second.insert("amount".into(), json!("10.00"));

        assert_eq!(
            canonical_payload(&first).unwrap(),
            canonical_payload(&second).unwrap()
        );
        assert_eq!(
            canonical_payload(&first).unwrap(),
            canonical_payload(&first).unwrap()
        );
    }

    #[test]
    fn sign_matches_known_hmac_vector() {
        assert_eq!(
            sign(b"key", b"The quick brown fox jumps over the lazy dog"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn verify_accepts_own_signature_and_rejects_tampering() {
        let body = canonical_json(&json!({"ticket_id": 7, "status": "open"})).unwrap();
        let header = signature_header(b"s3cret", body.as_bytes());
        assert!(header.starts_with("sha256="));
        verify(b"s3cret", body.as_bytes(), &header).unwrap();

        let mut tampered = body.clone().into_bytes();
        tampered[2] ^= 0x01;
        assert_ne!(sign(b"s3cret", &tampered), sign(b"s3cret", body.as_bytes()));
        assert!(matches!(
            verify(b"s3cret", &tampered, &header),
            Err(SignatureError::SignatureMismatch)
        ));
        assert!(matches!(
            verify(b"other", body.as_bytes(), &header),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn verify_rejects_malformed_headers() {
        assert!(matches!(
            verify(b"k", b"{}", "md5=abcd"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            verify(b"k", b"{}", "sha256=not-hex"),
            Err(SignatureError::InvalidHex)
        ));
    }
}
