//! Chat-completion clients.
//!
//! [`OpenAIChatModel`] calls `POST /v1/chat/completions` with the shared
//! retry policy from [`crate::upstream`]. [`DisabledChatModel`] fails every
//! call; callers with a local fallback (intent classification, resume
//! screening, summaries) degrade gracefully, the rest surface an upstream
//! error.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use curie_core::llm::{ChatModel, CompletionOptions, PromptMessage};
use tracing::debug;

use crate::config::LlmConfig;
use crate::upstream::JsonEndpoint;

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";

pub struct DisabledChatModel;

#[async_trait]
impl ChatModel for DisabledChatModel {
    async fn complete(&self, _messages: &[PromptMessage], _options: CompletionOptions) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

/// Chat model backed by the OpenAI API (or a compatible server).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIChatModel {
    model: String,
    endpoint: JsonEndpoint,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.base_url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE);
        let endpoint = JsonEndpoint::new(
            format!("{}/chat/completions", base.trim_end_matches('/')),
            config.timeout_secs,
            config.max_retries,
            "OpenAI",
        )?
        .with_bearer(api_key);
        Ok(Self {
            model: config.model.clone(),
            endpoint,
        })
    }
}

fn request_body(model: &str, messages: &[PromptMessage], options: CompletionOptions) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
    });
    if options.json_mode {
        body["response_format"] = serde_json::json!({"type": "json_object"});
    }
    if let Some(t) = options.temperature {
        body["temperature"] = serde_json::json!(t);
    }
    body
}

/// Text of the first choice; missing or null content reads as empty.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices array"))?;
    Ok(choices
        .first()
        .and_then(|c| c.pointer("/message/content"))
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    async fn complete(&self, messages: &[PromptMessage], options: CompletionOptions) -> Result<String> {
        debug!(model = %self.model, messages = messages.len(), json_mode = options.json_mode, "chat completion");
        let json = self
            .endpoint
            .post(&request_body(&self.model, messages, options))
            .await?;
        parse_completion(&json)
    }
}

pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChatModel)),
        "openai" => Ok(Arc::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
