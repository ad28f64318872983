//! Error types for aitest-providers

use aitest_core::InvocationError;
use thiserror::Error;

/// Errors raised while configuring or calling a provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Client could not be configured (bad key, bad URL, TLS setup)
    #[error("provider configuration error: {0}")]
    Config(String),

    /// Provider answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request never got a response
    #[error("request failed: {0}")]
    Transport(String),

    /// Response body did not match the provider's schema
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<ProviderError> for InvocationError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status, body } => InvocationError::Provider {
                status,
                message: body,
            },
            ProviderError::Transport(msg) => InvocationError::Transport(msg),
            ProviderError::InvalidResponse(msg) => InvocationError::InvalidResponse(msg),
            ProviderError::Json(e) => InvocationError::InvalidResponse(e.to_string()),
            other => InvocationError::Transport(other.to_string()),
        }
    }
}

/// `Result` alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
