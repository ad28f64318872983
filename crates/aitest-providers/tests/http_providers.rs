//! Provider clients against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use aitest_core::{InvocationError, InvocationRequest, ModelInvoker};
use aitest_providers::{
    AnthropicClient, OpenAiClient, ProviderConfig, ProviderRouter, Vendor, ANTHROPIC_VERSION,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(vendor: &str, model: &str) -> InvocationRequest {
    InvocationRequest {
        vendor: vendor.into(),
        model: model.into(),
        system_prompt: "Translate to French".into(),
        user_content: "Good morning".into(),
    }
}

fn config(vendor: Vendor, server: &MockServer) -> ProviderConfig {
    ProviderConfig::for_vendor(vendor)
        .with_base_url(server.uri())
        .with_timeout(Duration::from_secs(5))
}

#[tokio::test]
async fn test_openai_chat_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 1000,
            "messages": [
                {"role": "system", "content": "Translate to French"},
                {"role": "user", "content": "Good morning"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Bonjour"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 2, "total_tokens": 14}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = OpenAiClient::new("sk-test", config(Vendor::OpenAi, &server)).unwrap();
    let out = client.invoke(request("openai", "gpt-4o-mini")).await.unwrap();

    assert_eq!(out.text, "Bonjour");
    assert_eq!(out.usage.get("prompt_tokens"), Some(12));
    assert_eq!(out.usage.total_tokens(), 14);
}

#[tokio::test]
async fn test_anthropic_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-ant"))
        .and(header("anthropic-version", ANTHROPIC_VERSION))
        .and(body_partial_json(json!({
            "model": "claude-3-haiku",
            "system": "Translate to French",
            "messages": [{"role": "user", "content": "Good morning"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "Bonjour"}],
            "usage": {"input_tokens": 9, "output_tokens": 3}
        })))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-ant", config(Vendor::Anthropic, &server)).unwrap();
    let out = client.invoke(request("anthropic", "claude-3-haiku")).await.unwrap();

    assert_eq!(out.text, "Bonjour");
    assert_eq!(out.usage.get("input_tokens"), Some(9));
    assert_eq!(out.usage.total_tokens(), 12);
}

#[tokio::test]
async fn test_non_success_status_carries_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let client = OpenAiClient::new("sk-test", config(Vendor::OpenAi, &server)).unwrap();
    let err = client.invoke(request("openai", "gpt-4o")).await.unwrap_err();

    assert_eq!(
        err,
        InvocationError::Provider {
            status: 429,
            message: "rate limited".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
        .mount(&server)
        .await;

    let client = AnthropicClient::new("sk-ant", config(Vendor::Anthropic, &server)).unwrap();
    let err = client.invoke(request("anthropic", "claude")).await.unwrap_err();
    assert!(matches!(err, InvocationError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    // A port that was just released has no listener behind it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let cfg = ProviderConfig::for_vendor(Vendor::OpenAi)
        .with_base_url(base)
        .with_timeout(Duration::from_secs(2));
    let client = OpenAiClient::new("sk-test", cfg).unwrap();
    let err = client.invoke(request("openai", "gpt-4o")).await.unwrap_err();
    assert!(matches!(err, InvocationError::Transport(_)), "{err:?}");
}

#[tokio::test]
async fn test_router_dispatches_by_vendor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "from openai"}}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "from anthropic"}]
        })))
        .mount(&server)
        .await;

    let openai = OpenAiClient::new("k", config(Vendor::OpenAi, &server)).unwrap();
    let anthropic = AnthropicClient::new("k", config(Vendor::Anthropic, &server)).unwrap();
    let router = ProviderRouter::new()
        .with_client(Vendor::OpenAi, Arc::new(openai))
        .with_client(Vendor::Anthropic, Arc::new(anthropic));

    let a = router.invoke(request("OpenAI", "gpt")).await.unwrap();
    let b = router.invoke(request("anthropic", "claude")).await.unwrap();
    assert_eq!(a.text, "from openai");
    assert!(a.usage.is_empty());
    assert_eq!(b.text, "from anthropic");
}
