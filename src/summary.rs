//! Rolling session summaries.
//!
//! Once a session holds at least `conversation.summary_threshold` messages,
//! the most recent ones are condensed by the LLM into the session's running
//! summary, replacing the previous one. Summaries are best-effort: every
//! failure is logged and swallowed.

use anyhow::Result;
use curie_core::llm::{CompletionOptions, PromptMessage};
use tracing::{debug, warn};

use crate::context::ServiceContext;

const SYSTEM_PROMPT: &str = "You are a chat history summarizer.";
/// Extra messages fetched beyond the threshold.
const LOOKBACK_SLACK: usize = 5;

/// Refresh the session summary if the threshold is met. Never fails.
pub async fn summarize_if_needed(ctx: &ServiceContext, session_id: &str) {
    match refresh_summary(ctx, session_id).await {
        Ok(true) => debug!(session_id, "running summary updated"),
        Ok(false) => {}
        Err(e) => warn!(session_id, error = %format!("{e:#}"), "summary refresh failed"),
    }
}

/// Returns whether a new summary was stored.
async fn refresh_summary(ctx: &ServiceContext, session_id: &str) -> Result<bool> {
    let threshold = ctx.config.conversation.summary_threshold;
    let messages = ctx
        .chats
        .recent_messages(session_id, threshold + LOOKBACK_SLACK)
        .await?;
    if messages.len() < threshold {
        return Ok(false);
    }

    let history = messages
        .iter()
        .map(|m| format!("[{}] {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = [
        PromptMessage::system(SYSTEM_PROMPT),
        PromptMessage::user(format!(
            "Summarize the following chat so we can continue later:\n{}",
            history
        )),
    ];
    let summary = ctx.llm.complete(&prompt, CompletionOptions::default()).await?;

    if ctx.chats.get_session(session_id).await?.is_none() {
        return Ok(false);
    }
    ctx.chats.set_running_summary(session_id, &summary).await?;
    Ok(true)
}
