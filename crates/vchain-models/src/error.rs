//! Validation errors for model construction.

use thiserror::Error;

/// Result type for model validation.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while validating caller-supplied model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Invalid seconds value: must be 4, 8, or 12, got {0}")]
    InvalidSeconds(u32),

    #[error("Invalid video size '{0}': expected WIDTHxHEIGHT")]
    InvalidSize(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid provider configuration: {0}")]
    InvalidProvider(String),

    #[error("Invalid API key format: {0}")]
    InvalidCredential(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl ModelError {
    pub fn invalid_provider(msg: impl Into<String>) -> Self {
        Self::InvalidProvider(msg.into())
    }

    pub fn invalid_credential(msg: impl Into<String>) -> Self {
        Self::InvalidCredential(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

impl From<validator::ValidationErrors> for ModelError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
