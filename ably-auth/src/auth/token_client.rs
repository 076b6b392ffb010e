//! Token issuance: exchanges a signed token request (or an externally
//! supplied credential) for a token.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::auth::token_details::TokenDetails;
use crate::auth::token_request::{SignedTokenRequest, TokenParams, TokenRequestBuilder};
use crate::auth::ResolvedAuthOptions;
use crate::error::{AblyError, AblyResult};
use crate::http::{HttpMethod, Response, Transport};

/// What a token source may hand back: a ready token, a signed request to
/// exchange at the issuance endpoint, or a bare token string. This is the
/// same contract the remote issuance endpoint follows.
#[derive(Debug, Clone)]
pub enum TokenSourceResponse {
    Details(TokenDetails),
    Request(SignedTokenRequest),
    Literal(String),
}

/// Caller-supplied token source invoked with the resolved token params.
pub type AuthCallback =
    Arc<dyn Fn(&TokenParams) -> AblyResult<TokenSourceResponse> + Send + Sync>;

/// Issues tokens by exactly one strategy, in precedence order:
/// auth callback, auth URL, local signing with the key secret.
pub(crate) struct TokenClient<'a> {
    pub transport: &'a dyn Transport,
    pub rng: &'a Mutex<StdRng>,
}

impl TokenClient<'_> {
    pub async fn issue(
        &self,
        params: &TokenParams,
        options: &ResolvedAuthOptions,
    ) -> AblyResult<TokenDetails> {
        if let Some(callback) = &options.auth_callback {
            debug!("issuing token via auth_callback");
            let response = callback(params)
                .map_err(|e| AblyError::callback(format!("auth_callback failed: {}", e)))?;
            return self.interpret(response, options).await;
        }

        if let Some(auth_url) = &options.auth_url {
            debug!(auth_url = %auth_url, "issuing token via auth_url");
            let response = self.fetch_from_auth_url(auth_url, params, options).await?;
            return self.interpret(response, options).await;
        }

        if options.key_secret.is_some() {
            debug!("issuing token via client-side signing");
            let builder = TokenRequestBuilder {
                key_name: options.key_name.as_deref(),
                key_secret: options.key_secret.as_deref(),
                query_time: options.query_time,
            };
            let request = builder.build(params, self.transport, self.rng).await?;
            return self.exchange(&request, options).await;
        }

        Err(AblyError::auth_parameters(
            "requesting a token requires an auth_callback, an auth_url or a key",
        ))
    }

    /// Submit a signed token request to the issuance endpoint. The request
    /// body is self-authenticating, so the call skips the Authorization
    /// header.
    pub async fn exchange(
        &self,
        request: &SignedTokenRequest,
        options: &ResolvedAuthOptions,
    ) -> AblyResult<TokenDetails> {
        request.validate()?;
        let path = format!("/keys/{}/requestToken", request.key_name);
        let body = serde_json::to_value(request)
            .map_err(|e| AblyError::decode(format!("unserializable token request: {}", e)))?;

        let response = self
            .transport
            .post(&path, &options.auth_headers, Some(body), true)
            .await?;
        if !response.is_success() {
            return Err(AblyError::from_response(response.status, &response.text));
        }
        let body = response
            .parsed_body
            .ok_or_else(|| AblyError::decode("token response is not JSON"))?;
        let details = TokenDetails::from_value(body)?;
        debug!(expires = ?details.expires, "token issued");
        Ok(details)
    }

    async fn fetch_from_auth_url(
        &self,
        auth_url: &str,
        params: &TokenParams,
        options: &ResolvedAuthOptions,
    ) -> AblyResult<TokenSourceResponse> {
        let response = match options.auth_method {
            HttpMethod::Get => {
                let mut query = options.auth_params.clone();
                query.extend(params_as_query(params));
                self.transport
                    .get(auth_url, &options.auth_headers, &query, true)
                    .await?
            }
            HttpMethod::Post => {
                let mut body = Map::new();
                for (key, value) in &options.auth_params {
                    body.insert(key.clone(), Value::String(value.clone()));
                }
                for (key, value) in params_as_query(params) {
                    body.insert(key, Value::String(value));
                }
                self.transport
                    .post(auth_url, &options.auth_headers, Some(Value::Object(body)), true)
                    .await?
            }
        };

        if !response.is_success() {
            return Err(AblyError::from_response(response.status, &response.text));
        }
        interpret_payload(&response)
    }

    async fn interpret(
        &self,
        response: TokenSourceResponse,
        options: &ResolvedAuthOptions,
    ) -> AblyResult<TokenDetails> {
        match response {
            TokenSourceResponse::Details(details) => Ok(details),
            TokenSourceResponse::Request(request) => self.exchange(&request, options).await,
            TokenSourceResponse::Literal(token) if !token.is_empty() => {
                Ok(TokenDetails::from_token(token))
            }
            TokenSourceResponse::Literal(_) => {
                Err(AblyError::callback("token source returned an empty token"))
            }
        }
    }
}

/// Classify an auth-url body: a signed token request (has a `mac`), ready
/// token details (has a `token`), or a bare token string.
fn interpret_payload(response: &Response) -> AblyResult<TokenSourceResponse> {
    if let Some(body) = &response.parsed_body {
        if let Some(object) = body.as_object() {
            if object.contains_key("mac") {
                let request: SignedTokenRequest = serde_json::from_value(body.clone())
                    .map_err(|e| {
                        AblyError::decode(format!("unparseable token request payload: {}", e))
                    })?;
                request.validate()?;
                return Ok(TokenSourceResponse::Request(request));
            }
            if object.contains_key("token") {
                return Ok(TokenSourceResponse::Details(TokenDetails::from_value(
                    body.clone(),
                )?));
            }
            return Err(AblyError::decode(
                "auth_url body is neither a token request nor token details",
            ));
        }
        if let Some(token) = body.as_str() {
            if token.is_empty() {
                return Err(AblyError::decode("auth_url returned an empty token"));
            }
            return Ok(TokenSourceResponse::Literal(token.to_string()));
        }
    }
    let token = response.text.trim();
    if token.is_empty() {
        return Err(AblyError::decode("auth_url returned an empty body"));
    }
    Ok(TokenSourceResponse::Literal(token.to_string()))
}

fn params_as_query(params: &TokenParams) -> Vec<(String, String)> {
    let mut query = Vec::new();
    if let Some(client_id) = &params.client_id {
        query.push(("clientId".to_string(), client_id.clone()));
    }
    if let Some(capability) = &params.capability {
        query.push(("capability".to_string(), capability.to_canonical_string()));
    }
    if let Some(ttl) = params.ttl {
        query.push(("ttl".to_string(), ttl.to_string()));
    }
    if let Some(timestamp) = params.timestamp {
        query.push(("timestamp".to_string(), timestamp.to_string()));
    }
    if let Some(nonce) = &params.nonce {
        query.push(("nonce".to_string(), nonce.clone()));
    }
    query
}
