//! Receiver-side webhook verification.

use serde::de::DeserializeOwned;

use crate::signature::{self, SignatureError};

/// Verify and deserialize an incoming evhub webhook.
///
/// * `secret` – the subscription secret shared with the evhub server.
/// * `body` – raw request body bytes, exactly as received.
/// * `signature_header` – value of the `X-Webhook-Signature` header.
///
/// # Example
///
/// ```ignore
/// use evhub_sdk::client::verify_webhook;
///
/// let payload: serde_json::Value =
///     verify_webhook(b"subscription-secret", &body, signature_header)?;
/// ```
pub fn verify_webhook<T: DeserializeOwned>(
    secret: &[u8],
    body: &[u8],
    signature_header: &str,
) -> Result<T, SignatureError> {
    signature::verify(secret, body, signature_header)?;
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn verified_body_is_deserialized() {
        let body = signature::canonical_json(&json!({"user_id": 5})).unwrap();
        let header = signature::signature_header(b"secret", body.as_bytes());

        let value: serde_json::Value =
            verify_webhook(b"secret", body.as_bytes(), &header).unwrap();
        assert_eq!(value["user_id"], 5);

        let err = verify_webhook::<serde_json::Value>(b"nope", body.as_bytes(), &header);
        assert!(matches!(err, Err(SignatureError::SignatureMismatch)));
    }
}
