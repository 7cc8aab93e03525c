//! In-memory store implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock`. Insertion order
//! stands in for SQLite's rowid when breaking timestamp ties.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{ChatMessage, ChatSession, Chunk, Document, ToolInvocation, ToolStatus};

use super::{AccountStore, ChatStore, DocumentStore, InsertOutcome};

/// In-memory store implementing every store trait.
#[derive(Default)]
pub struct InMemoryStore {
    docs: RwLock<Vec<Document>>,
    chunks: RwLock<Vec<Chunk>>,
    sessions: RwLock<Vec<ChatSession>>,
    messages: RwLock<Vec<ChatMessage>>,
    invocations: RwLock<Vec<ToolInvocation>>,
    accounts: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert_document(&self, doc: &Document) -> Result<InsertOutcome> {
        let mut docs = write(&self.docs)?;
        if let Some(existing) = docs.iter().find(|d| d.content_hash == doc.content_hash) {
            return Ok(InsertOutcome::DuplicateHash {
                existing_id: Some(existing.id.clone()),
            });
        }
        docs.push(doc.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let docs = read(&self.docs)?;
        let mut stored = write(&self.chunks)?;
        for c in chunks {
            if !docs.iter().any(|d| d.id == c.document_id) {
                return Err(anyhow!("chunk {} references unknown document {}", c.id, c.document_id));
            }
            if stored
                .iter()
                .any(|s| s.document_id == c.document_id && s.chunk_index == c.chunk_index)
            {
                return Err(anyhow!(
                    "duplicate chunk index {} for document {}",
                    c.chunk_index,
                    c.document_id
                ));
            }
            stored.push(c.clone());
        }
        Ok(())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let docs = read(&self.docs)?;
        Ok(docs.iter().find(|d| d.content_hash == content_hash).cloned())
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let docs = read(&self.docs)?;
        Ok(docs.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = read(&self.docs)?;
        let mut out: Vec<Document> = docs.iter().rev().cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let mut docs = write(&self.docs)?;
        let before = docs.len();
        docs.retain(|d| d.id != id);
        if docs.len() == before {
            return Ok(false);
        }
        write(&self.chunks)?.retain(|c| c.document_id != id);
        Ok(true)
    }

    async fn chunk_embeddings(&self, document_id: &str) -> Result<Vec<Vec<f32>>> {
        let chunks = self.document_chunks(document_id).await?;
        Ok(chunks.into_iter().filter_map(|c| c.embedding).collect())
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let chunks = read(&self.chunks)?;
        let mut out: Vec<Chunk> = chunks
            .iter()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.chunk_index);
        Ok(out)
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        Ok(read(&self.chunks)?.clone())
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn create_session(&self, session: &ChatSession) -> Result<()> {
        write(&self.sessions)?.push(session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        Ok(read(&self.sessions)?.iter().find(|s| s.id == id).cloned())
    }

    async fn list_sessions(&self, owner_id: &str) -> Result<Vec<ChatSession>> {
        let sessions = read(&self.sessions)?;
        let mut out: Vec<ChatSession> = sessions
            .iter()
            .rev()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn rename_session(&self, id: &str, title: &str) -> Result<()> {
        let mut sessions = write(&self.sessions)?;
        if let Some(s) = sessions.iter_mut().find(|s| s.id == id) {
            s.title = title.to_string();
        }
        Ok(())
    }

    async fn set_running_summary(&self, id: &str, summary: &str) -> Result<()> {
        let mut sessions = write(&self.sessions)?;
        if let Some(s) = sessions.iter_mut().find(|s| s.id == id) {
            s.running_summary = Some(summary.to_string());
        }
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let mut sessions = write(&self.sessions)?;
        let before = sessions.len();
        sessions.retain(|s| s.id != id);
        if sessions.len() == before {
            return Ok(false);
        }
        write(&self.messages)?.retain(|m| m.session_id != id);
        write(&self.invocations)?.retain(|i| i.session_id != id);
        Ok(true)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<()> {
        if !read(&self.sessions)?.iter().any(|s| s.id == message.session_id) {
            return Err(anyhow!("message {} references unknown session", message.id));
        }
        write(&self.messages)?.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let messages = read(&self.messages)?;
        let mut out: Vec<ChatMessage> = messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        out.sort_by_key(|m| m.created_at);
        Ok(out)
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let all = self.list_messages(session_id).await?;
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn get_invocation(&self, id: &str) -> Result<Option<ToolInvocation>> {
        Ok(read(&self.invocations)?.iter().find(|i| i.id == id).cloned())
    }

    async fn list_invocations(&self, session_id: &str) -> Result<Vec<ToolInvocation>> {
        Ok(read(&self.invocations)?
            .iter()
            .filter(|i| i.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn record_turn(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
        invocation: Option<&ToolInvocation>,
    ) -> Result<u64> {
        // Every lock is held and every check made before anything changes.
        let sessions = read(&self.sessions)?;
        let mut stored_messages = write(&self.messages)?;
        let mut invocations = write(&self.invocations)?;

        if let Some(m) = messages
            .iter()
            .find(|m| !sessions.iter().any(|s| s.id == m.session_id))
        {
            return Err(anyhow!("message {} references unknown session", m.id));
        }
        if let Some(inv) = invocation {
            if invocations
                .iter()
                .any(|i| i.id == inv.id || i.trigger_message_id == inv.trigger_message_id)
            {
                return Err(anyhow!(
                    "message {} already has a tool invocation",
                    inv.trigger_message_id
                ));
            }
        }

        let mut cancelled = 0;
        for inv in invocations
            .iter_mut()
            .filter(|i| i.session_id == session_id && i.is_pending())
        {
            inv.status = ToolStatus::Cancelled;
            cancelled += 1;
        }
        stored_messages.extend(messages.iter().cloned());
        if let Some(inv) = invocation {
            invocations.push(inv.clone());
        }
        Ok(cancelled)
    }

    async fn transition_invocation(
        &self,
        id: &str,
        to: ToolStatus,
        input_payload: Option<&serde_json::Value>,
        result_payload: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let mut invocations = write(&self.invocations)?;
        let Some(inv) = invocations.iter_mut().find(|i| i.id == id && i.is_pending()) else {
            return Ok(false);
        };
        inv.status = to;
        if let Some(input) = input_payload {
            inv.input_payload = input.clone();
        }
        if let Some(result) = result_payload {
            inv.result_payload = Some(result.clone());
        }
        Ok(true)
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn account_role(&self, account_id: &str) -> Result<Option<String>> {
        Ok(read(&self.accounts)?.get(account_id).cloned())
    }

    async fn set_account_role(&self, account_id: &str, role: &str) -> Result<()> {
        write(&self.accounts)?.insert(account_id.to_string(), role.to_string());
        Ok(())
    }
}
