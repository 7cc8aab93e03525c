//! Duplicate detection for incoming documents.
//!
//! Two checks run before a document is stored:
//!
//! 1. **Exact**: the extracted text is normalized (lowercased, whitespace
//!    collapsed, trimmed) and hashed with SHA-256. Any stored document with
//!    the same hash is a duplicate.
//! 2. **Semantic**: the candidate's document vector is compared with every
//!    stored document's vector by cosine similarity. The best match at or
//!    above the threshold is a duplicate.
//!
//! Stored documents without a persisted vector get one recomputed from
//! their chunk embeddings; documents with no embedded chunks are skipped.
//! Documents are scanned newest first and the first one reaching the top
//! score wins a tie.

use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::embedding::{cosine_similarity, mean_vector};
use crate::error::Conflict;
use crate::store::DocumentStore;

/// Similarity at or above which a document counts as a near-duplicate.
pub const DEFAULT_SEMANTIC_THRESHOLD: f32 = 0.75;

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    Unique,
    ExactDuplicate { existing_id: String },
    SemanticDuplicate { existing_id: String, similarity: f32 },
}

impl DuplicateVerdict {
    /// The conflict to report, or `None` for [`DuplicateVerdict::Unique`].
    pub fn into_conflict(self) -> Option<Conflict> {
        match self {
            DuplicateVerdict::Unique => None,
            DuplicateVerdict::ExactDuplicate { existing_id } => Some(Conflict::ExactDuplicate {
                existing_id: Some(existing_id),
            }),
            DuplicateVerdict::SemanticDuplicate {
                existing_id,
                similarity,
            } => Some(Conflict::SemanticDuplicate {
                existing_id,
                similarity,
            }),
        }
    }
}

/// Lowercase, collapse runs of whitespace to one space, trim.
pub fn normalize_for_hash(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_for_hash(text).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Exact check against a precomputed [`content_hash`].
async fn check_exact(store: &dyn DocumentStore, hash: &str) -> Result<DuplicateVerdict> {
    Ok(match store.find_by_hash(hash).await? {
        Some(existing) => DuplicateVerdict::ExactDuplicate {
            existing_id: existing.id,
        },
        None => DuplicateVerdict::Unique,
    })
}

/// Semantic check of a candidate document vector against the corpus.
async fn check_semantic(
    store: &dyn DocumentStore,
    candidate: &[f32],
    threshold: f32,
) -> Result<DuplicateVerdict> {
    let mut best: Option<(String, f32)> = None;

    for doc in store.list_documents().await? {
        let vector = match doc.doc_embedding {
            Some(v) => v,
            None => {
                let chunk_vecs = store.chunk_embeddings(&doc.id).await?;
                match mean_vector(chunk_vecs.iter().map(Vec::as_slice)) {
                    Some(v) => v,
                    None => continue,
                }
            }
        };
        let sim = cosine_similarity(candidate, &vector);
        let best_sim = best.as_ref().map_or(0.0, |(_, s)| *s);
        if sim > best_sim {
            best = Some((doc.id, sim));
        }
    }

    Ok(match best {
        Some((existing_id, similarity)) if similarity >= threshold => {
            DuplicateVerdict::SemanticDuplicate {
                existing_id,
                similarity,
            }
        }
        _ => DuplicateVerdict::Unique,
    })
}

/// Run the exact check, then the semantic check when a vector is given.
pub async fn check_duplicate(
    store: &dyn DocumentStore,
    candidate_text: &str,
    candidate_vector: Option<&[f32]>,
    threshold: f32,
) -> Result<DuplicateVerdict> {
    let exact = check_exact(store, &content_hash(candidate_text)).await?;
    if exact != DuplicateVerdict::Unique {
        return Ok(exact);
    }
    match candidate_vector {
        Some(v) => check_semantic(store, v, threshold).await,
        None => Ok(DuplicateVerdict::Unique),
    }
}
