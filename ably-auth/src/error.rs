// Error handling for the Ably auth core, compatible with the Ably error
// code envelope returned by the REST service.

use serde::Deserialize;
use thiserror::Error;

/// Type alias for Ably results
pub type AblyResult<T> = Result<T, AblyError>;

#[derive(Debug, Error)]
pub enum AblyError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("invalid client configuration: {message}")]
    Configuration { message: String },

    #[error("no key specified: {message}")]
    MissingKey { message: String },

    #[error("incompatible key specified: {message}")]
    IncompatibleKey { message: String },

    #[error("must include valid auth parameters: {message}")]
    AuthParameters { message: String },

    #[error("auth callback failed: {message}")]
    Callback { message: String },

    #[error("service error {code} (HTTP {status_code}): {message}")]
    Service {
        status_code: u16,
        code: u32,
        message: String,
    },

    #[error("network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("decode error: {message}")]
    Decode { message: String },
}

impl AblyError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a construction-time configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a missing key error
    pub fn missing_key(message: impl Into<String>) -> Self {
        Self::MissingKey {
            message: message.into(),
        }
    }

    /// Create an incompatible key error
    pub fn incompatible_key(message: impl Into<String>) -> Self {
        Self::IncompatibleKey {
            message: message.into(),
        }
    }

    /// Create an auth parameters error
    pub fn auth_parameters(message: impl Into<String>) -> Self {
        Self::AuthParameters {
            message: message.into(),
        }
    }

    /// Create a callback error
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Create a service error with explicit status and Ably error code
    pub fn service(status_code: u16, code: u32, message: impl Into<String>) -> Self {
        Self::Service {
            status_code,
            code,
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Build a service error from a non-2xx response body, preserving the
    /// remote status and Ably error code when the body carries the standard
    /// error envelope.
    pub fn from_response(status_code: u16, body: &str) -> Self {
        if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
            let status = envelope.error.status_code.unwrap_or(status_code);
            let message = envelope
                .error
                .message
                .unwrap_or_else(|| body.to_string());
            return Self::service(status, envelope.error.code, message);
        }
        Self::service(status_code, u32::from(status_code) * 100, body.to_string())
    }

    /// HTTP status code associated with this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            AblyError::Validation { .. } | AblyError::AuthParameters { .. } => Some(400),
            AblyError::MissingKey { .. } | AblyError::IncompatibleKey { .. } => Some(401),
            AblyError::Service { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }

    /// Ably error code associated with this error, if any
    pub fn error_code(&self) -> Option<u32> {
        match self {
            AblyError::Validation { .. } | AblyError::AuthParameters { .. } => Some(40000),
            AblyError::MissingKey { .. } => Some(40101),
            AblyError::IncompatibleKey { .. } => Some(40102),
            AblyError::Service { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Standard Ably error envelope: `{"error": {"code", "statusCode", "message"}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: u32,
    #[serde(rename = "statusCode")]
    status_code: Option<u16>,
    message: Option<String>,
}
