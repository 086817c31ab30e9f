//! Provider error types.

use thiserror::Error;
use vchain_models::ModelError;

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Message used when a failed response carries no error envelope.
pub const FALLBACK_MESSAGE: &str = "Provider API error";

/// Errors that can occur while talking to a generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Caller input or configuration rejected before any request was sent.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Non-success response from the provider.
    #[error("Provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Build an API error from a failed response body.
    ///
    /// Uses `error.message` from the upstream envelope when present.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let message = extract_error_message(body).unwrap_or_else(|| FALLBACK_MESSAGE.to_string());
        Self::api(status, message)
    }

    /// HTTP status of the failure, if one was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            ProviderError::Api { status, .. } => Some(*status),
            ProviderError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether a caller could reasonably retry the request later.
    ///
    /// Nothing in this crate retries automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ProviderError::Validation(_))
    }
}

impl From<ModelError> for ProviderError {
    fn from(err: ModelError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// Extract `error.message` (or a bare string `error`) from an error body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        serde_json::Value::String(s) => s.as_str(),
        other => other.get("message")?.as_str()?,
    };
    let message = message.trim();
    (!message.is_empty()).then(|| message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_message_extracted() {
        let err = ProviderError::from_http_status(
            400,
            r#"{"error":{"message":"Your prompt was flagged","type":"invalid_request_error"}}"#,
        );
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Your prompt was flagged");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fallback_message() {
        for body in ["", "<html>502</html>", r#"{"error":{}}"#, r#"{"error":{"message":"  "}}"#] {
            let err = ProviderError::from_http_status(502, body);
            assert!(matches!(err, ProviderError::Api { ref message, .. } if message == FALLBACK_MESSAGE));
        }
    }

    #[test]
    fn test_bare_string_error() {
        assert_eq!(
            extract_error_message(r#"{"error":"Invalid API key format"}"#).as_deref(),
            Some("Invalid API key format")
        );
    }

    #[test]
    fn test_classification() {
        assert!(ProviderError::api(503, "busy").is_retryable());
        assert!(ProviderError::api(429, "slow down").is_retryable());
        assert!(!ProviderError::api(400, "bad").is_retryable());
        assert!(ProviderError::from(ModelError::MissingField("endpoint")).is_validation());
    }
}
