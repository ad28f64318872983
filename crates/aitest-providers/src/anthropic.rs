//! Anthropic messages client.

use aitest_core::{InvocationError, InvocationOutput, InvocationRequest, ModelInvoker, Usage};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::http::{build_client, post_json};

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl AnthropicClient {
    pub fn new(api_key: &str, config: ProviderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));
        let key = HeaderValue::from_str(api_key)
            .map_err(|_| ProviderError::Config("invalid Anthropic API key format".into()))?;
        headers.insert("x-api-key", key);

        let client = build_client(config.timeout, headers)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
        let body = MessagesRequest {
            model: &request.model,
            system: &request.system_prompt,
            messages: [UserMessage {
                role: "user",
                content: &request.user_content,
            }],
            max_tokens: self.config.max_tokens,
        };

        let url = self.config.endpoint("messages");
        let (response, elapsed): (MessagesResponse, _) =
            post_json(&self.client, &url, &body).await?;

        let text = response
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no text block".into()))?;

        let usage = response
            .usage
            .map(|u| {
                Usage::new()
                    .with("input_tokens", u.input_tokens)
                    .with("output_tokens", u.output_tokens)
            })
            .unwrap_or_default();

        Ok(InvocationOutput {
            text,
            elapsed,
            usage,
        })
    }
}

#[async_trait]
impl ModelInvoker for AnthropicClient {
    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError> {
        self.complete(&request).await.map_err(Into::into)
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: [UserMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct MessagesUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}
