//! Shared request plumbing for the provider clients.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ProviderError, Result};

/// Longest error body carried into a [`ProviderError::Status`].
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout: Duration, headers: HeaderMap) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(|e| ProviderError::Config(format!("failed to create HTTP client: {e}")))
}

/// POSTs `body` as JSON and decodes a 2xx response into `R`.
///
/// Returns the decoded body and the time spent waiting on the provider.
pub(crate) async fn post_json<B, R>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<(R, Duration)>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let started = Instant::now();
    let response = client.post(url).json(body).send().await?;
    let status = response.status();
    let text = response.text().await?;
    let elapsed = started.elapsed();

    debug!(url, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "provider responded");

    if !status.is_success() {
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: excerpt(&text),
        });
    }

    let decoded = serde_json::from_str(&text)
        .map_err(|e| ProviderError::InvalidResponse(format!("{e}: {}", excerpt(&text))))?;
    Ok((decoded, elapsed))
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        return trimmed.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &trimmed[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(excerpt("  short  "), "short");
        let long = "é".repeat(400);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= MAX_ERROR_BODY + 3);
    }
}
