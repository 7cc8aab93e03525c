//! Chat-completion trait and message types.
//!
//! The concrete OpenAI client lives in the `curie` app crate; tests use
//! scripted implementations of [`ChatModel`].

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::Role;

/// One message in a completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompletionOptions {
    /// Ask the model for a single JSON object.
    pub json_mode: bool,
    pub temperature: Option<f32>,
}

impl CompletionOptions {
    pub fn json() -> Self {
        Self {
            json_mode: true,
            temperature: Some(0.0),
        }
    }
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the assistant text of the first choice (possibly empty).
    async fn complete(&self, messages: &[PromptMessage], options: CompletionOptions)
        -> Result<String>;
}

/// Pull the first JSON object out of a model reply.
///
/// Models occasionally wrap JSON in a fenced code block or add prose
/// around it even in JSON mode.
pub fn extract_json_object(reply: &str) -> Option<serde_json::Value> {
    let trimmed = reply.trim();
    if let Ok(v @ serde_json::Value::Object(_)) = serde_json::from_str(trimmed) {
        return Some(v);
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str(&trimmed[start..=end]) {
        Ok(v @ serde_json::Value::Object(_)) => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plain_object() {
        let v = extract_json_object(r#"{"intent": "rag"}"#).unwrap();
        assert_eq!(v["intent"], "rag");
    }

    #[test]
    fn test_extract_fenced_object() {
        let reply = "```json\n{\"match\": 80, \"reason\": \"ok\"}\n```";
        let v = extract_json_object(reply).unwrap();
        assert_eq!(v["match"], 80);
    }

    #[test]
    fn test_extract_rejects_non_objects() {
        assert!(extract_json_object("[1, 2]").is_none());
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("} backwards {").is_none());
    }

    #[test]
    fn test_prompt_message_serializes_role() {
        let json = serde_json::to_value(PromptMessage::system("be brief")).unwrap();
        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "be brief");
    }
}
