//! Token request assembly: fills defaults, normalizes the capability and
//! signs the result.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::capability::Capability;
use crate::auth::signer::{self, SignableFields};
use crate::auth::timestamp_ms;
use crate::error::{AblyError, AblyResult};
use crate::http::Transport;

/// Input bag for a token request. Every field is optional; `None` means
/// "unset, fill in the default", which is distinct from an explicitly
/// empty value. `nonce` and `mac` are normally library-generated but may
/// be supplied by test harnesses exercising malformed-signature paths.
#[derive(Debug, Clone, Default)]
pub struct TokenParams {
    /// Key name override; must match the signing key when both are given.
    pub key_name: Option<String>,
    pub client_id: Option<String>,
    pub capability: Option<Capability>,
    /// Requested token lifetime in milliseconds.
    pub ttl: Option<i64>,
    /// Milliseconds since the unix epoch.
    pub timestamp: Option<i64>,
    pub nonce: Option<String>,
    pub mac: Option<String>,
}

impl TokenParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn ttl(mut self, ttl_ms: i64) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    pub fn timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }
}

/// A fully signed token request, ready to submit to
/// `POST /keys/{keyName}/requestToken`. `ttl` is omitted entirely when
/// unset; the service treats absence as "default ttl", not zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTokenRequest {
    pub key_name: String,
    #[serde(default)]
    pub capability: String,
    #[serde(default)]
    pub client_id: String,
    pub timestamp: i64,
    pub nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    pub mac: String,
}

impl SignedTokenRequest {
    /// Check the invariants of an externally supplied request (e.g. from an
    /// auth callback): key name and mac must be present and non-empty.
    pub fn validate(&self) -> AblyResult<&Self> {
        if self.key_name.is_empty() {
            return Err(AblyError::validation("token request has no keyName"));
        }
        if self.mac.is_empty() {
            return Err(AblyError::validation("token request has no mac"));
        }
        Ok(self)
    }
}

/// Collision-resistant 16-digit decimal nonce. Uniqueness across requests,
/// not secrecy, is the requirement.
pub(crate) fn generate_nonce(rng: &mut StdRng) -> String {
    format!("{:016}", rng.gen_range(0..=9_999_999_999_999_999u64))
}

/// Assembles and signs token requests for one signing key.
pub(crate) struct TokenRequestBuilder<'a> {
    pub key_name: Option<&'a str>,
    pub key_secret: Option<&'a str>,
    pub query_time: bool,
}

impl TokenRequestBuilder<'_> {
    pub async fn build(
        &self,
        params: &TokenParams,
        transport: &dyn Transport,
        rng: &Mutex<StdRng>,
    ) -> AblyResult<SignedTokenRequest> {
        if let Some(requested) = params.key_name.as_deref() {
            // A caller-named key must match the signing key; a client with
            // no key of its own cannot sign for anyone else's.
            if self.key_name != Some(requested) {
                return Err(AblyError::incompatible_key(format!(
                    "token params name the key '{}' but the client signs with '{}'",
                    requested,
                    self.key_name.unwrap_or("")
                )));
            }
        }
        let key_name = params
            .key_name
            .as_deref()
            .or(self.key_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AblyError::missing_key("no key name specified"))?;
        let key_secret = self
            .key_secret
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| AblyError::missing_key("no key secret specified"))?;

        let timestamp = match params.timestamp {
            Some(timestamp) => timestamp,
            None if self.query_time => transport.server_time().await?,
            None => timestamp_ms(),
        };

        let capability = params
            .capability
            .as_ref()
            .map(Capability::to_canonical_string)
            .unwrap_or_default();
        let client_id = params.client_id.clone().unwrap_or_default();
        let nonce = match params.nonce.clone() {
            Some(nonce) => nonce,
            None => generate_nonce(&mut rng.lock()),
        };

        let fields = SignableFields {
            key_name,
            ttl: params.ttl,
            capability: &capability,
            client_id: &client_id,
            timestamp,
            nonce: &nonce,
        };
        let mac = match params.mac.clone() {
            // Escape hatch for harnesses exercising bad-signature paths.
            Some(mac) => mac,
            None => signer::sign(key_secret, &fields)?,
        };
        debug!(key_name, timestamp, "signed token request");

        Ok(SignedTokenRequest {
            key_name: key_name.to_string(),
            capability,
            client_id,
            timestamp,
            nonce,
            ttl: params.ttl,
            mac,
        })
    }
}
