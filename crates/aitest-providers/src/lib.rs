//! Model provider clients for aitest.
//!
//! Each client implements [`aitest_core::ModelInvoker`]. [`ProviderRouter`]
//! picks one per request from the prompt's vendor name.

pub mod anthropic;
pub mod config;
pub mod error;
mod http;
pub mod openai;
pub mod router;

pub use anthropic::{AnthropicClient, ANTHROPIC_VERSION};
pub use config::{
    Credentials, ProviderConfig, Vendor, DEFAULT_CREDENTIALS_FILE, DEFAULT_MAX_TOKENS,
    DEFAULT_TIMEOUT,
};
pub use error::{ProviderError, Result};
pub use openai::OpenAiClient;
pub use router::ProviderRouter;
