//! Deterministic stub invokers and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aitest_core::{
    CaseDefinition, Catalog, InvocationError, InvocationOutput, InvocationRequest, ModelInvoker,
    PromptConfig, Usage,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

type InvokeResult = Result<InvocationOutput, InvocationError>;

/// Catalog with one prompt per `(name, case count)` pair.
pub fn catalog(layout: &[(&str, usize)]) -> Arc<Catalog> {
    let prompts = layout
        .iter()
        .map(|(name, _)| PromptConfig::new(*name, "openai", "gpt-4o-mini", "Answer as {{persona}}"))
        .collect();
    let cases: HashMap<String, Vec<CaseDefinition>> = layout
        .iter()
        .map(|(name, n)| {
            let cases = (0..*n)
                .map(|i| {
                    CaseDefinition::new(format!("{name}-{i}"), format!("case {i}"), format!("input {i}"))
                        .with_arg("persona", "a pirate")
                })
                .collect();
            (name.to_string(), cases)
        })
        .collect();
    Arc::new(Catalog::new(prompts, cases))
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn ok(request: &InvocationRequest, elapsed: Duration) -> InvokeResult {
    Ok(InvocationOutput {
        text: format!("echo: {}", request.user_content),
        elapsed,
        usage: Usage::new()
            .with("prompt_tokens", 10)
            .with("completion_tokens", 5)
            .with("total_tokens", 15),
    })
}

/// Succeeds after a fixed latency.
pub struct AlwaysOk {
    pub latency: Duration,
}

impl AlwaysOk {
    pub fn instant() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }
}

#[async_trait]
impl ModelInvoker for AlwaysOk {
    async fn invoke(&self, request: InvocationRequest) -> InvokeResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        ok(&request, self.latency)
    }
}

pub struct AlwaysFail;

#[async_trait]
impl ModelInvoker for AlwaysFail {
    async fn invoke(&self, _request: InvocationRequest) -> InvokeResult {
        Err(InvocationError::Provider {
            status: 503,
            message: "service unavailable".into(),
        })
    }
}

/// Panics for any case whose content equals `trigger`.
pub struct PanicsOn {
    pub trigger: String,
}

#[async_trait]
impl ModelInvoker for PanicsOn {
    async fn invoke(&self, request: InvocationRequest) -> InvokeResult {
        if request.user_content == self.trigger {
            panic!("stub invoker exploded");
        }
        ok(&request, Duration::ZERO)
    }
}

/// Tracks how many calls are in flight at once.
pub struct Counting {
    pub latency: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl Counting {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelInvoker for Counting {
    async fn invoke(&self, request: InvocationRequest) -> InvokeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        ok(&request, self.latency)
    }
}

/// Lets the first `complete` calls succeed, cancels `token` during the last
/// of them, and leaves every later call hanging forever.
pub struct CancelAfter {
    pub complete: usize,
    pub token: CancellationToken,
    calls: AtomicUsize,
}

impl CancelAfter {
    pub fn new(complete: usize, token: CancellationToken) -> Self {
        Self {
            complete,
            token,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ModelInvoker for CancelAfter {
    async fn invoke(&self, request: InvocationRequest) -> InvokeResult {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n > self.complete {
            std::future::pending::<()>().await;
        }
        if n == self.complete {
            self.token.cancel();
        }
        ok(&request, Duration::from_millis(1))
    }
}
