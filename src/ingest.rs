//! Document ingestion pipeline.
//!
//! `ingest` runs, in order:
//!
//! 1. text extraction through the [`ExtractorChain`](crate::extract::ExtractorChain)
//!    cascade (blank text → `UnparseableInput`);
//! 2. exact dedupe on the normalized-text hash;
//! 3. line-respecting chunking;
//! 4. one batched embedding call, doc vector = mean of chunk vectors;
//! 5. semantic dedupe on the doc vector, when there is one;
//! 6. raw bytes written to blob storage;
//! 7. document row insert (a unique-hash collision here is a lost race and
//!    is reported as an exact duplicate);
//! 8. chunk row inserts, NUL bytes stripped.
//!
//! Steps 6–8 are not transactional: a failure after 6 can leave an
//! orphaned file behind.

use curie_core::chunk::{chunk_text, sanitize_chunk_text};
use curie_core::dedupe::{check_duplicate, content_hash};
use curie_core::embedding::mean_vector;
use curie_core::error::{Conflict, Error, Result};
use curie_core::models::Document;
use curie_core::store::InsertOutcome;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{now_ts, ServiceContext};
use crate::extract::extract_text;
use crate::storage::BlobStorage;

pub async fn ingest(
    ctx: &ServiceContext,
    uploader_id: &str,
    filename: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<Document> {
    let text = extract_text(&ctx.extractors, filename, content_type, bytes.to_vec()).await;
    if text.trim().is_empty() {
        info!(filename, "ingest rejected: no extractable text");
        return Err(Error::UnparseableInput(format!(
            "no text could be extracted from {}",
            filename
        )));
    }

    let threshold = ctx.config.dedupe.semantic_threshold;
    // Exact pass; runs before any embedding call.
    let verdict = check_duplicate(ctx.documents.as_ref(), &text, None, threshold).await?;
    if let Some(conflict) = verdict.into_conflict() {
        info!(filename, %conflict, "ingest rejected");
        return Err(conflict.into());
    }

    let document_id = Uuid::new_v4().to_string();
    let mut chunks = chunk_text(&document_id, &text, ctx.config.chunking.max_chars);
    let pieces: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let embeddings = embed_chunks(ctx, &pieces).await?;
    let doc_embedding = mean_vector(embeddings.iter().flatten().map(Vec::as_slice));

    if let Some(vector) = doc_embedding.as_deref() {
        let verdict =
            check_duplicate(ctx.documents.as_ref(), &text, Some(vector), threshold).await?;
        if let Some(conflict) = verdict.into_conflict() {
            info!(filename, %conflict, "ingest rejected");
            return Err(conflict.into());
        }
    }

    let saved = ctx
        .blobs
        .save(&BlobStorage::document_path(filename), bytes)
        .await?;

    let doc = Document {
        id: document_id,
        uploader_id: uploader_id.to_string(),
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        storage_path: saved.path.display().to_string(),
        size: saved.size as i64,
        content_hash: content_hash(&text),
        doc_embedding,
        created_at: now_ts(),
    };

    if let InsertOutcome::DuplicateHash { existing_id } = ctx.documents.insert_document(&doc).await? {
        warn!(filename, existing = ?existing_id, "concurrent duplicate won the insert");
        return Err(Conflict::ExactDuplicate { existing_id }.into());
    }

    for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
        let (text, changed) = sanitize_chunk_text(&chunk.text);
        if changed {
            warn!(
                document_id = %doc.id,
                chunk_index = chunk.chunk_index,
                "stripped NUL bytes from chunk"
            );
        }
        chunk.text = text;
        chunk.embedding = embedding;
    }
    ctx.documents.insert_chunks(&chunks).await?;

    info!(
        document_id = %doc.id,
        filename,
        chunks = chunks.len(),
        embedded = doc.doc_embedding.is_some(),
        "document ingested"
    );
    Ok(doc)
}

/// One vector slot per chunk; `None` where nothing was embedded.
async fn embed_chunks(ctx: &ServiceContext, pieces: &[String]) -> Result<Vec<Option<Vec<f32>>>> {
    if pieces.is_empty() || !ctx.embedder.is_enabled() {
        return Ok(vec![None; pieces.len()]);
    }
    let vectors = ctx
        .embedder
        .embed(pieces)
        .await
        .map_err(|e| Error::Upstream(format!("embedding failed: {e:#}")))?;
    if vectors.len() != pieces.len() {
        warn!(
            expected = pieces.len(),
            got = vectors.len(),
            "embedding count mismatch; unmatched chunks stored without vectors"
        );
    }
    let mut slots: Vec<Option<Vec<f32>>> = vectors.into_iter().map(Some).collect();
    slots.resize(pieces.len(), None);
    Ok(slots)
}

pub async fn list_documents(ctx: &ServiceContext) -> Result<Vec<Document>> {
    Ok(ctx.documents.list_documents().await?)
}

pub async fn get_document(ctx: &ServiceContext, id: &str) -> Result<Document> {
    ctx.documents
        .get_document(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("document {}", id)))
}

/// Delete a document and its chunks. The stored file is left in place.
pub async fn delete_document(ctx: &ServiceContext, id: &str) -> Result<()> {
    if !ctx.documents.delete_document(id).await? {
        return Err(Error::not_found(format!("document {}", id)));
    }
    info!(document_id = id, "document deleted");
    Ok(())
}
