//! The issued token as returned by the service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AblyError, AblyResult};

/// An issued token. `expires` is milliseconds since the unix epoch; absent
/// means the token never expires. The remaining fields are round-tripped
/// from the service response when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl TokenDetails {
    /// Wrap a bare token string with no expiry metadata.
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires: None,
            issued: None,
            capability: None,
            client_id: None,
        }
    }

    /// Deserialize from a service response body.
    pub fn from_value(value: Value) -> AblyResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| AblyError::decode(format!("unparseable token response: {}", e)))
    }

    /// Whether the token is expired at `now_ms`. A token without an
    /// `expires` field never expires.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires {
            Some(expires) => expires <= now_ms,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_issuance_response() {
        let details = TokenDetails::from_value(json!({
            "token": "tok123",
            "expires": 2_000_000,
            "issued": 1_000_000,
            "clientId": "cid",
            "capability": "{\"*\":[\"*\"]}"
        }))
        .unwrap();
        assert_eq!(details.token, "tok123");
        assert_eq!(details.expires, Some(2_000_000));
        assert_eq!(details.client_id.as_deref(), Some("cid"));
    }

    #[test]
    fn minimal_response_has_no_expiry() {
        let details = TokenDetails::from_value(json!({"token": "tok123"})).unwrap();
        assert_eq!(details.expires, None);
        assert!(!details.is_expired(i64::MAX));
    }

    #[test]
    fn expiry_boundary() {
        let details = TokenDetails {
            expires: Some(1000),
            ..TokenDetails::from_token("t")
        };
        assert!(details.is_expired(1000));
        assert!(details.is_expired(1001));
        assert!(!details.is_expired(999));
    }

    #[test]
    fn missing_token_field_is_a_decode_error() {
        assert!(matches!(
            TokenDetails::from_value(json!({"expires": 1})),
            Err(AblyError::Decode { .. })
        ));
    }
}
