//! SQLite-backed store implementation.
//!
//! Implements [`DocumentStore`], [`ChatStore`] and [`AccountStore`] over the
//! schema created by [`crate::migrate`]. Vectors are stored as
//! little-endian f32 BLOBs. Timestamp ties are broken by `rowid`, i.e.
//! insertion order.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use curie_core::embedding::{blob_to_vec, vec_to_blob};
use curie_core::models::{ChatMessage, ChatSession, Chunk, Document, ToolInvocation, ToolStatus};
use curie_core::store::{AccountStore, ChatStore, DocumentStore, InsertOutcome};

/// SQLite implementation of the store traits.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DOCUMENT_COLUMNS: &str = "id, uploader_id, filename, content_type, storage_path, size, \
                                content_hash, doc_embedding, created_at";

const INVOCATION_COLUMNS: &str = "id, session_id, trigger_message_id, tool_kind, status, \
                                  input_payload, result_payload, created_at";

async fn insert_message(conn: &mut SqliteConnection, message: &ChatMessage) -> Result<()> {
    sqlx::query(
        "INSERT INTO chat_messages (id, session_id, role, content, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&message.id)
    .bind(&message.session_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(message.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

fn row_to_document(row: &SqliteRow) -> Document {
    let blob: Option<Vec<u8>> = row.get("doc_embedding");
    Document {
        id: row.get("id"),
        uploader_id: row.get("uploader_id"),
        filename: row.get("filename"),
        content_type: row.get("content_type"),
        storage_path: row.get("storage_path"),
        size: row.get("size"),
        content_hash: row.get("content_hash"),
        doc_embedding: blob.map(|b| blob_to_vec(&b)),
        created_at: row.get("created_at"),
    }
}

fn row_to_chunk(row: &SqliteRow) -> Chunk {
    let blob: Option<Vec<u8>> = row.get("embedding");
    Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        embedding: blob.map(|b| blob_to_vec(&b)),
    }
}

fn row_to_session(row: &SqliteRow) -> ChatSession {
    ChatSession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        running_summary: row.get("running_summary"),
        created_at: row.get("created_at"),
    }
}

fn row_to_message(row: &SqliteRow) -> Result<ChatMessage> {
    let role: String = row.get("role");
    Ok(ChatMessage {
        id: row.get("id"),
        session_id: row.get("session_id"),
        role: role.parse()?,
        content: row.get("content"),
        created_at: row.get("created_at"),
    })
}

fn row_to_invocation(row: &SqliteRow) -> Result<ToolInvocation> {
    let kind: String = row.get("tool_kind");
    let status: String = row.get("status");
    let input: String = row.get("input_payload");
    let result: Option<String> = row.get("result_payload");
    Ok(ToolInvocation {
        id: row.get("id"),
        session_id: row.get("session_id"),
        trigger_message_id: row.get("trigger_message_id"),
        kind: kind.parse()?,
        status: status.parse()?,
        input_payload: serde_json::from_str(&input)?,
        result_payload: result.map(|r| serde_json::from_str(&r)).transpose()?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert_document(&self, doc: &Document) -> Result<InsertOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (id, uploader_id, filename, content_type, storage_path,
                                   size, content_hash, doc_embedding, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.uploader_id)
        .bind(&doc.filename)
        .bind(&doc.content_type)
        .bind(&doc.storage_path)
        .bind(doc.size)
        .bind(&doc.content_hash)
        .bind(doc.doc_embedding.as_deref().map(vec_to_blob))
        .bind(doc.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(e) if is_unique_violation(&e) => {
                let existing_id = self.find_by_hash(&doc.content_hash).await?.map(|d| d.id);
                Ok(InsertOutcome::DuplicateHash { existing_id })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(chunk.embedding.as_deref().map(vec_to_blob))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn find_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE content_hash = ?"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn chunk_embeddings(&self, document_id: &str) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query(
            "SELECT embedding FROM chunks WHERE document_id = ? AND embedding IS NOT NULL ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                blob_to_vec(&blob)
            })
            .collect())
    }

    async fn document_chunks(&self, document_id: &str) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, text, embedding FROM chunks ORDER BY rowid",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_chunk).collect())
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    async fn create_session(&self, session: &ChatSession) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_sessions (id, owner_id, title, running_summary, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.owner_id)
        .bind(&session.title)
        .bind(&session.running_summary)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, running_summary, created_at FROM chat_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn list_sessions(&self, owner_id: &str) -> Result<Vec<ChatSession>> {
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, title, running_summary, created_at
            FROM chat_sessions
            WHERE owner_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_session).collect())
    }

    async fn rename_session(&self, id: &str, title: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET title = ? WHERE id = ?")
            .bind(title)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_running_summary(&self, id: &str, summary: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sessions SET running_summary = ? WHERE id = ?")
            .bind(summary)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_message(&self, message: &ChatMessage) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_message(&mut conn, message).await
    }

    async fn list_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, created_at
            FROM chat_messages
            WHERE session_id = ?
            ORDER BY created_at ASC, rowid ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, created_at FROM (
                SELECT id, session_id, role, content, created_at, rowid AS rid
                FROM chat_messages
                WHERE session_id = ?
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?
            )
            ORDER BY created_at ASC, rid ASC
            "#,
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_message).collect()
    }

    async fn get_invocation(&self, id: &str) -> Result<Option<ToolInvocation>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOCATION_COLUMNS} FROM tool_invocations WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_invocation).transpose()
    }

    async fn list_invocations(&self, session_id: &str) -> Result<Vec<ToolInvocation>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOCATION_COLUMNS} FROM tool_invocations WHERE session_id = ? ORDER BY created_at, rowid"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_invocation).collect()
    }

    async fn record_turn(
        &self,
        session_id: &str,
        messages: &[ChatMessage],
        invocation: Option<&ToolInvocation>,
    ) -> Result<u64> {
        // Dropping `tx` without commit rolls every statement back.
        let mut tx = self.pool.begin().await?;

        let cancelled = sqlx::query(
            "UPDATE tool_invocations SET status = 'cancelled' WHERE session_id = ? AND status = 'pending'",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        for message in messages {
            insert_message(&mut tx, message).await?;
        }

        if let Some(invocation) = invocation {
            sqlx::query(&format!(
                "INSERT INTO tool_invocations ({INVOCATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(&invocation.id)
            .bind(&invocation.session_id)
            .bind(&invocation.trigger_message_id)
            .bind(invocation.kind.as_str())
            .bind(invocation.status.as_str())
            .bind(invocation.input_payload.to_string())
            .bind(invocation.result_payload.as_ref().map(|v| v.to_string()))
            .bind(invocation.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn transition_invocation(
        &self,
        id: &str,
        to: ToolStatus,
        input_payload: Option<&serde_json::Value>,
        result_payload: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tool_invocations
            SET status = ?,
                input_payload = COALESCE(?, input_payload),
                result_payload = COALESCE(?, result_payload)
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(input_payload.map(|v| v.to_string()))
        .bind(result_payload.map(|v| v.to_string()))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn account_role(&self, account_id: &str) -> Result<Option<String>> {
        let role: Option<String> = sqlx::query_scalar("SELECT role FROM accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(role)
    }

    async fn set_account_role(&self, account_id: &str, role: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO accounts (id, role) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET role = excluded.role",
        )
        .bind(account_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
