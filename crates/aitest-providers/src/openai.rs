//! OpenAI chat completions client.

use aitest_core::{InvocationError, InvocationOutput, InvocationRequest, ModelInvoker, Usage};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::ProviderConfig;
use crate::error::{ProviderError, Result};
use crate::http::{build_client, post_json};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl OpenAiClient {
    pub fn new(api_key: &str, config: ProviderConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| ProviderError::Config("invalid OpenAI API key format".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = build_client(config.timeout, headers)?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[instrument(skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &InvocationRequest) -> Result<InvocationOutput> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            max_tokens: self.config.max_tokens,
        };

        let url = self.config.endpoint("chat/completions");
        let (response, elapsed): (ChatResponse, _) = post_json(&self.client, &url, &body).await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("response has no choices".into()))?;

        let usage = response
            .usage
            .map(|u| {
                Usage::new()
                    .with("prompt_tokens", u.prompt_tokens)
                    .with("completion_tokens", u.completion_tokens)
                    .with("total_tokens", u.total_tokens)
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
impl ModelInvoker for OpenAiClient {
    async fn invoke(
        &self,
        request: InvocationRequest,
    ) -> std::result::Result<InvocationOutput, InvocationError> {
        self.complete(&request).await.map_err(Into::into)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
