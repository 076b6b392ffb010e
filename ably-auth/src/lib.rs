//! Ably authentication core
//!
//! This crate implements the authentication and authorization core of an
//! Ably REST client: basic auth with a long-lived API key, token auth with
//! short-lived issued tokens, and the signing protocol for requesting and
//! renewing those tokens.

pub mod auth;
pub mod error;
pub mod http;
pub mod logging;

pub use auth::{Auth, AuthMethod, AuthOptions, AuthOverrides, TokenParams};
pub use auth::capability::Capability;
pub use auth::token_details::TokenDetails;
pub use auth::token_request::SignedTokenRequest;
pub use error::{AblyError, AblyResult};

pub fn version() -> &'static str {
    "0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(version(), "0.1.0");
    }
}
