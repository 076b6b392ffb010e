// HTTP transport boundary for the auth core.
//
// The auth core never talks to reqwest directly: it goes through the
// `Transport` trait so that token issuance can be exercised against a mock
// in tests. `RestTransport` is the reqwest-backed implementation used by a
// real client. Requests carrying a signed token request are sent with
// `skip_auth` so the transport does not re-enter the auth coordinator.

use std::sync::Weak;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{AblyError, AblyResult};

pub use self::config::{HttpConfig, HttpConfigBuilder};

mod config;

/// HTTP methods used by the auth core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    Get,
    #[default]
    Post,
}

/// Response surface exposed to the auth core
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub text: String,
    pub parsed_body: Option<Value>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport collaborator the auth core calls into
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request. `url` may be a path relative to the configured
    /// base URL or an absolute URL (e.g. an external auth URL).
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        params: &[(String, String)],
        skip_auth: bool,
    ) -> AblyResult<Response>;

    /// Issue a POST request with an optional JSON body.
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Option<Value>,
        skip_auth: bool,
    ) -> AblyResult<Response>;

    /// Service time in milliseconds since the unix epoch, used when the
    /// `query_time` option is enabled.
    async fn server_time(&self) -> AblyResult<i64>;
}

/// Supplies the `Authorization` header for ordinary requests. Implemented
/// by the auth coordinator; the transport holds it weakly to avoid a
/// reference cycle.
#[async_trait]
pub trait AuthHeaderProvider: Send + Sync {
    async fn auth_headers(&self) -> AblyResult<Vec<(String, String)>>;
}

/// reqwest-backed transport for the Ably REST API
pub struct RestTransport {
    client: Client,
    config: HttpConfig,
    auth: RwLock<Option<Weak<dyn AuthHeaderProvider>>>,
}

impl RestTransport {
    pub fn new(config: HttpConfig) -> AblyResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AblyError::network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            auth: RwLock::new(None),
        })
    }

    /// Register the auth coordinator that supplies `Authorization` headers
    /// for requests not flagged with `skip_auth`. Registered after the
    /// coordinator is constructed, hence the late binding.
    pub fn set_auth_provider(&self, provider: Weak<dyn AuthHeaderProvider>) {
        *self.auth.write() = Some(provider);
    }

    fn full_url(&self, url: &str) -> String {
        if url.starts_with("http") {
            url.to_string()
        } else {
            format!("{}{}", self.config.base_url, url)
        }
    }

    async fn auth_headers(&self, skip_auth: bool) -> AblyResult<Vec<(String, String)>> {
        if skip_auth {
            return Ok(Vec::new());
        }
        let provider = self.auth.read().as_ref().and_then(Weak::upgrade);
        match provider {
            Some(provider) => provider.auth_headers().await,
            None => Ok(Vec::new()),
        }
    }

    async fn finish(request: reqwest::RequestBuilder) -> AblyResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AblyError::network(format!("request timeout: {}", e))
            } else if e.is_connect() {
                AblyError::network(format!("connection failed: {}", e))
            } else {
                AblyError::network(format!("network error: {}", e))
            }
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AblyError::network(format!("failed to read response: {}", e)))?;
        let parsed_body = serde_json::from_str(&text).ok();

        Ok(Response {
            status,
            text,
            parsed_body,
        })
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
        params: &[(String, String)],
        skip_auth: bool,
    ) -> AblyResult<Response> {
        let mut url = self.full_url(url);
        if !params.is_empty() {
            let query = serde_urlencoded::to_string(params)
                .map_err(|e| AblyError::validation(format!("bad query params: {}", e)))?;
            let sep = if url.contains('?') { '&' } else { '?' };
            url.push(sep);
            url.push_str(&query);
        }
        debug!(url = %url, "GET");

        let mut request = self.client.get(&url);
        for (key, value) in self.auth_headers(skip_auth).await? {
            request = request.header(&key, &value);
        }
        for (key, value) in headers {
            request = request.header(key, value);
        }
        Self::finish(request).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Option<Value>,
        skip_auth: bool,
    ) -> AblyResult<Response> {
        let url = self.full_url(url);
        debug!(url = %url, "POST");

        let mut request = self.client.post(&url);
        for (key, value) in self.auth_headers(skip_auth).await? {
            request = request.header(&key, &value);
        }
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        Self::finish(request).await
    }

    async fn server_time(&self) -> AblyResult<i64> {
        let response = self.get("/time", &[], &[], true).await?;
        if !response.is_success() {
            return Err(AblyError::from_response(response.status, &response.text));
        }
        let times: Vec<i64> = response
            .parsed_body
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or_else(|| AblyError::decode("unparseable time response"))?;
        times
            .first()
            .copied()
            .ok_or_else(|| AblyError::decode("empty time response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_success_range() {
        let ok = Response {
            status: 201,
            text: String::new(),
            parsed_body: None,
        };
        let not_ok = Response {
            status: 401,
            text: String::new(),
            parsed_body: None,
        };
        assert!(ok.is_success());
        assert!(!not_ok.is_success());
    }

    #[test]
    fn default_method_is_post() {
        assert_eq!(HttpMethod::default(), HttpMethod::Post);
    }
}
