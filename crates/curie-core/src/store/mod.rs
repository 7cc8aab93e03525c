//! Storage abstraction for Curie.
//!
//! [`DocumentStore`] covers the ingestion/retrieval corpus, [`ChatStore`]
//! the conversation state and [`AccountStore`] the role lookup used by
//! the capability check. The SQLite backend lives in the app crate; an
//! in-memory backend lives in [`memory`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{ChatMessage, ChatSession, Chunk, Document, ToolInvocation, ToolStatus};

/// Result of inserting a document row.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The unique content-hash constraint rejected the row. Carries the
    /// winner's id when it can be read back.
    DuplicateHash { existing_id: Option<String> },
}

/// Persistence for documents and their chunks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert_document`](DocumentStore::insert_document) | Insert a document row, enforcing hash uniqueness |
/// | [`insert_chunks`](DocumentStore::insert_chunks) | Insert chunk rows with their embeddings |
/// | [`find_by_hash`](DocumentStore::find_by_hash) | Exact-dedupe lookup |
/// | [`list_documents`](DocumentStore::list_documents) | All documents, newest first |
/// | [`chunk_embeddings`](DocumentStore::chunk_embeddings) | Embedded vectors of one document |
/// | [`all_chunks`](DocumentStore::all_chunks) | Full-corpus chunk scan |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, doc: &Document) -> Result<InsertOutcome>;

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>>;

    async fn get_document(&self, id: &str) -> Result<Option<Document>>;

    /// Newest first; ties keep reverse insertion order.
    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Delete a document and its chunks. Returns `false` if absent.
    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Embeddings of the document's chunks that have one, by chunk index.
    async fn chunk_embeddings(&self, document_id: &str) -> Result<Vec<Vec<f32>>>;

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>>;

    /// Every chunk in the store, in the store's scan order.
    async fn all_chunks(&self) -> Result<Vec<Chunk>>;
}

/// Persistence for sessions, messages and tool invocations.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn create_session(&self, session: &ChatSession) -> Result<()>;

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>>;

    /// Sessions owned by `owner_id`, newest first.
    async fn list_sessions(&self, owner_id: &str) -> Result<Vec<ChatSession>>;

    async fn rename_session(&self, id: &str, title: &str) -> Result<()>;

    /// Overwrite the running summary.
    async fn set_running_summary(&self, id: &str, summary: &str) -> Result<()>;

    /// Delete a session with its messages and invocations.
    async fn delete_session(&self, id: &str) -> Result<bool>;

    async fn append_message(&self, message: &ChatMessage) -> Result<()>;

    /// All messages of a session, oldest first.
    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// The last `limit` messages of a session, oldest first.
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    async fn get_invocation(&self, id: &str) -> Result<Option<ToolInvocation>>;

    async fn list_invocations(&self, session_id: &str) -> Result<Vec<ToolInvocation>>;

    /// Record one turn atomically: cancel every pending invocation of the
    /// session, append `messages` in order, then create `invocation` when
    /// given. Nothing is kept if any step fails. Returns how many
    /// invocations were cancelled.
    async fn record_turn(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
        invocation: Option<&ToolInvocation>,
    ) -> Result<u64>;

    /// Compare-and-set from `pending` to `to`, replacing the payloads that
    /// are given. Returns `false` when the invocation was not pending.
    async fn transition_invocation(
        &self,
        id: &str,
        to: ToolStatus,
        input_payload: Option<&serde_json::Value>,
        result_payload: Option<&serde_json::Value>,
    ) -> Result<bool>;
}

/// Current role of an account, re-read on every capability check.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn account_role(&self, account_id: &str) -> Result<Option<String>>;

    async fn set_account_role(&self, account_id: &str, role: &str) -> Result<()>;
}
