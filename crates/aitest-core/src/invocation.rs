//! Model Invocation Service contract.
//!
//! The engine only sees [`ModelInvoker`]; HTTP clients live in
//! `aitest-providers`.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::Usage;

/// One call to a model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub vendor: String,
    pub model: String,
    /// Resolved prompt template, sent as the system prompt.
    pub system_prompt: String,
    /// Case content, sent as the user message.
    pub user_content: String,
}

/// A successful provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutput {
    pub text: String,
    pub elapsed: Duration,
    pub usage: Usage,
}

/// Why a single invocation failed. Recorded on the case, never fatal to a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvocationError {
    #[error("unsupported vendor: {0}")]
    UnsupportedVendor(String),

    #[error("vendor {0} is not configured (missing API key?)")]
    NotConfigured(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Performs model calls. Implementations must tolerate many concurrent callers.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError>;
}
