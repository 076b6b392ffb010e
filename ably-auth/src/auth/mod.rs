//! Authentication core: decides between basic and token auth, caches the
//! current token, renews it on expiry and produces the per-request
//! `Authorization` header.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::error::{AblyError, AblyResult};
use crate::http::{AuthHeaderProvider, HttpMethod, Transport};

pub mod capability;
pub mod signer;
pub mod token_client;
pub mod token_details;
pub mod token_request;

pub use capability::Capability;
pub use token_client::{AuthCallback, TokenSourceResponse};
pub use token_details::TokenDetails;
pub use token_request::{SignedTokenRequest, TokenParams};

use token_client::TokenClient;
use token_request::TokenRequestBuilder;

/// Authentication method in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// Every request signed directly with the long-lived key
    Basic,
    /// Requests signed with a short-lived issued token
    Token,
}

/// Where tokens come from in token mode, in issuance precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Callback,
    Url,
    Secret,
    StaticToken,
}

/// The strategy chosen once at construction.
enum AuthStrategy {
    Basic { credentials: String },
    Token { source: TokenSource },
}

/// Client authentication options. `None` fields are unset; an explicitly
/// empty value is preserved as `Some("")` and never treated as unset.
#[derive(Clone, Default)]
pub struct AuthOptions {
    pub key_name: Option<String>,
    pub key_secret: Option<String>,
    pub client_id: Option<String>,
    pub auth_token: Option<String>,
    pub token_details: Option<TokenDetails>,
    pub auth_callback: Option<AuthCallback>,
    pub auth_url: Option<String>,
    /// HTTP method for the auth URL
    pub auth_method: HttpMethod,
    pub auth_headers: Vec<(String, String)>,
    pub auth_params: Vec<(String, String)>,
    /// `Some(true)` forces token auth; `Some(false)` forbids it
    pub use_token_auth: Option<bool>,
    /// Sign token requests with the service clock instead of the local one
    pub query_time: bool,
}

impl AuthOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a combined `"keyName:keySecret"` key string.
    pub fn with_key(key: &str) -> AblyResult<Self> {
        let (key_name, key_secret) = key
            .split_once(':')
            .filter(|(name, secret)| !name.is_empty() && !secret.is_empty())
            .ok_or_else(|| {
                AblyError::configuration("key must be of the form 'keyName:keySecret'")
            })?;
        Ok(Self {
            key_name: Some(key_name.to_string()),
            key_secret: Some(key_secret.to_string()),
            ..Self::default()
        })
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn token_details(mut self, details: TokenDetails) -> Self {
        self.token_details = Some(details);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn auth_callback(mut self, callback: AuthCallback) -> Self {
        self.auth_callback = Some(callback);
        self
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    pub fn use_token_auth(mut self, value: bool) -> Self {
        self.use_token_auth = Some(value);
        self
    }

    pub fn query_time(mut self, value: bool) -> Self {
        self.query_time = value;
        self
    }
}

impl fmt::Debug for AuthOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthOptions")
            .field("key_name", &self.key_name)
            .field("key_secret", &self.key_secret.as_deref().map(|_| "***"))
            .field("client_id", &self.client_id)
            .field("auth_token", &self.auth_token.as_deref().map(|_| "***"))
            .field("token_details", &self.token_details)
            .field("auth_callback", &self.auth_callback.as_ref().map(|_| "<fn>"))
            .field("auth_url", &self.auth_url)
            .field("auth_method", &self.auth_method)
            .field("use_token_auth", &self.use_token_auth)
            .field("query_time", &self.query_time)
            .finish()
    }
}

/// Per-call overrides for `authorize`/`request_token`. Every field is
/// optional; unset fields fall back to the instance options.
#[derive(Clone, Default)]
pub struct AuthOverrides {
    pub key_name: Option<String>,
    pub key_secret: Option<String>,
    pub auth_callback: Option<AuthCallback>,
    pub auth_url: Option<String>,
    pub auth_method: Option<HttpMethod>,
    pub auth_headers: Option<Vec<(String, String)>>,
    pub auth_params: Option<Vec<(String, String)>>,
    pub query_time: Option<bool>,
}

/// The effective option set for one issuance call.
pub(crate) struct ResolvedAuthOptions {
    pub key_name: Option<String>,
    pub key_secret: Option<String>,
    pub auth_callback: Option<AuthCallback>,
    pub auth_url: Option<String>,
    pub auth_method: HttpMethod,
    pub auth_headers: Vec<(String, String)>,
    pub auth_params: Vec<(String, String)>,
    pub query_time: bool,
}

/// Local time in milliseconds since the unix epoch
pub(crate) fn timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn base64_encode(value: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// The auth coordinator. One instance per client; owns the cached token
/// and the nonce generator.
pub struct Auth {
    options: AuthOptions,
    strategy: AuthStrategy,
    method: RwLock<AuthMethod>,
    token_details: tokio::sync::Mutex<Option<TokenDetails>>,
    rng: Mutex<StdRng>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth").finish_non_exhaustive()
    }
}

impl Auth {
    pub fn new(options: AuthOptions, transport: Arc<dyn Transport>) -> AblyResult<Self> {
        Self::with_rng(options, transport, StdRng::from_entropy())
    }

    /// Like [`Auth::new`] with an explicit nonce generator, for
    /// deterministic tests.
    pub fn with_rng(
        options: AuthOptions,
        transport: Arc<dyn Transport>,
        rng: StdRng,
    ) -> AblyResult<Self> {
        let must_use_token_auth = options.use_token_auth == Some(true);
        let must_not_use_token_auth = options.use_token_auth == Some(false);
        let can_use_basic_auth = options.key_secret.is_some() && options.client_id.is_none();

        if !must_use_token_auth && can_use_basic_auth {
            // We have the key and no identity to assert, default to basic.
            let key_name = options.key_name.as_deref().ok_or_else(|| {
                AblyError::configuration("a key secret was provided without a key name")
            })?;
            let key_secret = options.key_secret.as_deref().unwrap_or_default();
            debug!("anonymous, using basic auth");
            let credentials = base64_encode(&format!("{}:{}", key_name, key_secret));
            return Ok(Self {
                options,
                strategy: AuthStrategy::Basic { credentials },
                method: RwLock::new(AuthMethod::Basic),
                token_details: tokio::sync::Mutex::new(None),
                rng: Mutex::new(rng),
                transport,
            });
        }
        if must_not_use_token_auth && !can_use_basic_auth {
            return Err(AblyError::configuration(
                "use_token_auth is false, so a key without a client_id is required",
            ));
        }

        let initial_token = options.token_details.clone().or_else(|| {
            options
                .auth_token
                .as_deref()
                .map(TokenDetails::from_token)
        });

        let source = if options.auth_callback.is_some() {
            debug!("using token auth with auth_callback");
            TokenSource::Callback
        } else if options.auth_url.is_some() {
            debug!("using token auth with auth_url");
            TokenSource::Url
        } else if options.key_secret.is_some() {
            debug!("using token auth with client-side signing");
            TokenSource::Secret
        } else if initial_token.is_some() {
            debug!("using token auth with a supplied token");
            TokenSource::StaticToken
        } else {
            return Err(AblyError::configuration(
                "token auth requires an auth_callback, auth_url, key, token or token details",
            ));
        };

        Ok(Self {
            options,
            strategy: AuthStrategy::Token { source },
            method: RwLock::new(AuthMethod::Token),
            token_details: tokio::sync::Mutex::new(initial_token),
            rng: Mutex::new(rng),
            transport,
        })
    }

    /// Return a valid token, renewing if the cached one is absent, expired
    /// or `force` is set. The cache lock is held across renewal, so
    /// concurrent expired callers wait for the single in-flight renewal
    /// and observe its result instead of issuing their own.
    pub async fn authorize(
        &self,
        token_params: Option<&TokenParams>,
        overrides: Option<&AuthOverrides>,
        force: bool,
    ) -> AblyResult<TokenDetails> {
        *self.method.write() = AuthMethod::Token;

        let mut cached = self.token_details.lock().await;
        if let Some(details) = cached.as_ref() {
            if !force && !details.is_expired(timestamp_ms()) {
                if let Some(expires) = details.expires {
                    debug!(expires, "using cached token");
                }
                return Ok(details.clone());
            }
        }

        // Renewal path: drop the stale token first so a failed renewal
        // leaves us token-less rather than caching the failure.
        *cached = None;
        let details = self.issue_token(token_params, overrides).await?;
        *cached = Some(details.clone());
        Ok(details)
    }

    /// Issue a fresh token without touching the coordinator's cache.
    pub async fn request_token(
        &self,
        token_params: Option<&TokenParams>,
        overrides: Option<&AuthOverrides>,
    ) -> AblyResult<TokenDetails> {
        self.issue_token(token_params, overrides).await
    }

    /// Build a signed token request without submitting it, e.g. for a
    /// server minting requests on behalf of its own clients.
    pub async fn create_token_request(
        &self,
        token_params: Option<&TokenParams>,
        overrides: Option<&AuthOverrides>,
    ) -> AblyResult<SignedTokenRequest> {
        let options = self.resolve(overrides);
        let params = self.params_with_client_id(token_params);
        let builder = TokenRequestBuilder {
            key_name: options.key_name.as_deref(),
            key_secret: options.key_secret.as_deref(),
            query_time: options.query_time,
        };
        builder.build(&params, &*self.transport, &self.rng).await
    }

    /// The `Authorization` header for the next request. In basic mode this
    /// is deterministic; in token mode it may renew the token first.
    pub async fn auth_headers(&self) -> AblyResult<Vec<(String, String)>> {
        let method = *self.method.read();
        if let (AuthMethod::Basic, AuthStrategy::Basic { credentials }) = (method, &self.strategy) {
            return Ok(vec![(
                "Authorization".to_string(),
                format!("Basic {}", credentials),
            )]);
        }
        let details = self.authorize(None, None, false).await?;
        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {}", base64_encode(&details.token)),
        )])
    }

    pub fn auth_method(&self) -> AuthMethod {
        *self.method.read()
    }

    /// The token source selected at construction, if in token mode.
    pub fn token_source(&self) -> Option<TokenSource> {
        match &self.strategy {
            AuthStrategy::Basic { .. } => None,
            AuthStrategy::Token { source } => Some(*source),
        }
    }

    /// Base64 `keyName:keySecret` credential, if in basic mode.
    pub fn basic_credentials(&self) -> Option<&str> {
        match &self.strategy {
            AuthStrategy::Basic { credentials } => Some(credentials),
            AuthStrategy::Token { .. } => None,
        }
    }

    /// Base64 of the cached token, if one is held.
    pub async fn token_credentials(&self) -> Option<String> {
        let cached = self.token_details.lock().await;
        cached.as_ref().map(|details| base64_encode(&details.token))
    }

    pub async fn token_details(&self) -> Option<TokenDetails> {
        self.token_details.lock().await.clone()
    }

    pub fn options(&self) -> &AuthOptions {
        &self.options
    }

    async fn issue_token(
        &self,
        token_params: Option<&TokenParams>,
        overrides: Option<&AuthOverrides>,
    ) -> AblyResult<TokenDetails> {
        let options = self.resolve(overrides);
        let params = self.params_with_client_id(token_params);
        let client = TokenClient {
            transport: &*self.transport,
            rng: &self.rng,
        };
        client.issue(&params, &options).await
    }

    fn params_with_client_id(&self, token_params: Option<&TokenParams>) -> TokenParams {
        let mut params = token_params.cloned().unwrap_or_default();
        if params.client_id.is_none() {
            params.client_id = self.options.client_id.clone();
        }
        params
    }

    fn resolve(&self, overrides: Option<&AuthOverrides>) -> ResolvedAuthOptions {
        let empty = AuthOverrides::default();
        let ov = overrides.unwrap_or(&empty);
        ResolvedAuthOptions {
            key_name: ov.key_name.clone().or_else(|| self.options.key_name.clone()),
            key_secret: ov
                .key_secret
                .clone()
                .or_else(|| self.options.key_secret.clone()),
            auth_callback: ov
                .auth_callback
                .clone()
                .or_else(|| self.options.auth_callback.clone()),
            auth_url: ov.auth_url.clone().or_else(|| self.options.auth_url.clone()),
            auth_method: ov.auth_method.unwrap_or(self.options.auth_method),
            auth_headers: ov
                .auth_headers
                .clone()
                .unwrap_or_else(|| self.options.auth_headers.clone()),
            auth_params: ov
                .auth_params
                .clone()
                .unwrap_or_else(|| self.options.auth_params.clone()),
            query_time: ov.query_time.unwrap_or(self.options.query_time),
        }
    }
}

#[async_trait]
impl AuthHeaderProvider for Auth {
    async fn auth_headers(&self) -> AblyResult<Vec<(String, String)>> {
        Auth::auth_headers(self).await
    }
}
