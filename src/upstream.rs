//! Shared HTTP plumbing for outbound model calls.
//!
//! Both the embedding providers and the chat-completion client POST JSON
//! and retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, … (capped at 2^5)

use anyhow::{bail, Result};
use std::time::Duration;
use tracing::warn;

/// A JSON POST target with its retry budget.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    pub client: reqwest::Client,
    pub url: String,
    pub bearer: Option<String>,
    pub max_retries: u32,
    /// Used in error messages, e.g. `"OpenAI"`.
    pub label: &'static str,
}

impl JsonEndpoint {
    pub fn new(url: impl Into<String>, timeout_secs: u64, max_retries: u32, label: &'static str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            bearer: None,
            max_retries,
            label,
        })
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// POST `body` and return the parsed JSON response.
    pub async fn post(&self, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = backoff_delay(attempt);
                warn!(
                    endpoint = self.label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying upstream call"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.url).json(body);
            if let Some(token) = &self.bearer {
                request = request.header("Authorization", format!("Bearer {}", token));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(anyhow::anyhow!(
                            "{} API error {}: {}",
                            self.label,
                            status,
                            body_text
                        ));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("{} API error {}: {}", self.label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("{} connection error: {}", self.label, e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} call failed after retries", self.label)))
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    if cfg!(test) {
        return Duration::from_millis(10);
    }
    Duration::from_secs(1 << (attempt - 1).min(5))
}
