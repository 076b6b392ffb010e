//! Canonical signing for token requests.
//!
//! The sign text is a wire-format contract shared with the service's own
//! verifier: fields newline-joined in a fixed order with a trailing empty
//! field (so the text always ends in a newline). Changing the order or the
//! trailing newline breaks signature verification remotely.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AblyError, AblyResult};

type HmacSha256 = Hmac<Sha256>;

/// The fields covered by a token request signature, in signing order.
#[derive(Debug, Clone, Copy)]
pub struct SignableFields<'a> {
    pub key_name: &'a str,
    pub ttl: Option<i64>,
    pub capability: &'a str,
    pub client_id: &'a str,
    pub timestamp: i64,
    pub nonce: &'a str,
}

/// Build the canonical text to be signed:
/// `keyName\n{ttl|""}\n{capability}\n{clientId}\n{timestamp}\n{nonce}\n`
pub fn sign_text(fields: &SignableFields<'_>) -> String {
    let ttl = fields.ttl.map(|t| t.to_string()).unwrap_or_default();
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n",
        fields.key_name, ttl, fields.capability, fields.client_id, fields.timestamp, fields.nonce
    )
}

/// HMAC-SHA256 over the canonical text, base64-encoded. Pure and
/// deterministic: identical inputs always produce an identical mac.
pub fn sign(key_secret: &str, fields: &SignableFields<'_>) -> AblyResult<String> {
    compute_mac(key_secret, &sign_text(fields))
}

pub(crate) fn compute_mac(key_secret: &str, text: &str) -> AblyResult<String> {
    let mut mac = HmacSha256::new_from_slice(key_secret.as_bytes())
        .map_err(|e| AblyError::validation(format!("failed to create HMAC: {}", e)))?;
    mac.update(text.as_bytes());
    let digest = mac.finalize().into_bytes();
    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_fields() -> SignableFields<'static> {
        SignableFields {
            key_name: "abc",
            ttl: Some(1000),
            capability: r#"{"*":"*"}"#,
            client_id: "cid",
            timestamp: 1_000_000,
            nonce: "0000000000000001",
        }
    }

    #[test]
    fn sign_text_matches_wire_format() {
        assert_eq!(
            sign_text(&reference_fields()),
            "abc\n1000\n{\"*\":\"*\"}\ncid\n1000000\n0000000000000001\n"
        );
    }

    #[test]
    fn reference_mac() {
        // Cross-checked against the service's own HMAC-SHA256 signer.
        let mac = sign("s3cr3t", &reference_fields()).unwrap();
        assert_eq!(mac, "8De7c/lnq9FDFcvsSu5K2eXrYctv3Lk7KGP5k6TZf9g=");
    }

    #[test]
    fn absent_fields_sign_as_empty() {
        let fields = SignableFields {
            key_name: "app.key",
            ttl: None,
            capability: "",
            client_id: "",
            timestamp: 1_000_000,
            nonce: "abcdef0123456789",
        };
        assert_eq!(sign_text(&fields), "app.key\n\n\n\n1000000\nabcdef0123456789\n");
        assert_eq!(
            sign("secret", &fields).unwrap(),
            "jOu8m/tvJnWCuoaART6JiIZzont/d7MkgOGRvcyTL8U="
        );
    }

    #[test]
    fn signing_is_deterministic() {
        let first = sign("s3cr3t", &reference_fields()).unwrap();
        let second = sign("s3cr3t", &reference_fields()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn mac_depends_on_every_field() {
        let base = sign("s3cr3t", &reference_fields()).unwrap();
        let mut other = reference_fields();
        other.nonce = "0000000000000002";
        assert_ne!(base, sign("s3cr3t", &other).unwrap());
        assert_ne!(base, sign("other-secret", &reference_fields()).unwrap());
    }
}
