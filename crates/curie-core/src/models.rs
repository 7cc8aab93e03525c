//! Core data models used throughout Curie.
//!
//! Documents and chunks flow through the ingestion and retrieval pipeline;
//! sessions, messages and tool invocations make up the conversation state.
//! Timestamps are Unix seconds, as stored in SQLite.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Title used when a session is created without a usable one.
pub const DEFAULT_SESSION_TITLE: &str = "New chat";

/// An ingested document. `content_hash` is unique across the store.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub uploader_id: String,
    pub filename: String,
    pub content_type: String,
    pub storage_path: String,
    pub size: i64,
    pub content_hash: String,
    /// Mean of the chunk embeddings, absent when nothing was embedded.
    #[serde(skip)]
    pub doc_embedding: Option<Vec<f32>>,
    pub created_at: i64,
}

/// A contiguous slice of a document's extracted text.
#[derive(Debug, Clone, Serialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatSession {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub running_summary: Option<String>,
    pub created_at: i64,
}

impl ChatSession {
    pub fn is_owned_by(&self, account_id: &str) -> bool {
        self.owner_id == account_id
    }
}

/// Collapse whitespace, trim and clamp a session title to `max_chars`.
///
/// Returns `None` when nothing printable is left.
pub fn sanitize_title(raw: &str, max_chars: usize) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    let clamped: String = collapsed.chars().take(max_chars).collect();
    Some(clamped.trim_end().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// Append-only message. Ordered by `(created_at, insertion order)`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    ResumeMatch,
    DocGen,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::ResumeMatch => "resume_match",
            ToolKind::DocGen => "doc_gen",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Completed,
    Cancelled,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Pending => "pending",
            ToolStatus::Completed => "completed",
            ToolStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ToolStatus::Pending)
    }
}

macro_rules! impl_str_enum {
    ($ty:ty, $label:literal, [$($variant:expr),+ $(,)?]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = anyhow::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                [$($variant),+]
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| anyhow::anyhow!("unknown {}: '{}'", $label, s))
            }
        }
    };
}

impl_str_enum!(Role, "role", [Role::User, Role::Assistant, Role::System]);
impl_str_enum!(ToolKind, "tool kind", [ToolKind::ResumeMatch, ToolKind::DocGen]);
impl_str_enum!(
    ToolStatus,
    "tool status",
    [ToolStatus::Pending, ToolStatus::Completed, ToolStatus::Cancelled]
);

/// A single-use widget run anchored to one assistant message.
///
/// Transitions `pending -> completed` or `pending -> cancelled`, once.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub id: String,
    pub session_id: String,
    pub trigger_message_id: String,
    pub kind: ToolKind,
    pub status: ToolStatus,
    pub input_payload: serde_json::Value,
    pub result_payload: Option<serde_json::Value>,
    pub created_at: i64,
}

impl ToolInvocation {
    pub fn is_pending(&self) -> bool {
        self.status == ToolStatus::Pending
    }
}

/// A message as returned to callers, with the invocation it opened (if any).
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: ChatMessage,
    pub invocation: Option<ToolInvocation>,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            message,
            invocation: None,
        }
    }
}

/// Attribution for one retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Source {
    pub document_id: String,
    pub chunk_id: String,
    pub snippet: String,
}

/// Output of the retrieval question-answering path.
#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
}
