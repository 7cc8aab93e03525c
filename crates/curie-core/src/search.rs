//! Brute-force chunk retrieval.
//!
//! Every chunk in the store is scanned on each query; there is no vector
//! index. Two modes:
//!
//! - **Semantic**: used when at least one chunk carries an embedding. The
//!   query is embedded once, every embedded chunk is scored by cosine
//!   similarity and the list is sorted descending. The sort is stable, so
//!   equal scores keep the store's scan order.
//! - **Substring**: used when nothing is embedded. Chunks containing the
//!   query (case-insensitive) are returned shortest first.

use anyhow::{anyhow, Result};

use crate::embedding::{cosine_similarity, Embedder};
use crate::models::{Chunk, Source};
use crate::store::DocumentStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Semantic,
    Substring,
}

/// A retrieved chunk. `score` is the cosine similarity in semantic mode.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: Option<f32>,
}

/// Score embedded chunks against `query_vec`, best first, keeping `limit`.
pub fn rank_by_similarity(query_vec: &[f32], chunks: Vec<Chunk>, limit: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .filter_map(|chunk| {
            let score = cosine_similarity(query_vec, chunk.embedding.as_deref()?);
            Some(ScoredChunk {
                chunk,
                score: Some(score),
            })
        })
        .collect();
    scored.sort_by(|a, b| {
        let (sa, sb) = (a.score.unwrap_or(0.0), b.score.unwrap_or(0.0));
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

/// Case-insensitive substring matches, shortest chunk first.
pub fn substring_matches(query: &str, chunks: Vec<Chunk>, limit: usize) -> Vec<ScoredChunk> {
    let needle = query.trim().to_lowercase();
    let mut hits: Vec<Chunk> = chunks
        .into_iter()
        .filter(|c| c.text.to_lowercase().contains(&needle))
        .collect();
    hits.sort_by_key(|c| c.text.chars().count());
    hits.into_iter()
        .take(limit)
        .map(|chunk| ScoredChunk { chunk, score: None })
        .collect()
}

/// Retrieve the top `limit` chunks for `query` from the whole store.
pub async fn retrieve(
    store: &dyn DocumentStore,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
) -> Result<(RetrievalMode, Vec<ScoredChunk>)> {
    let chunks = store.all_chunks().await?;
    let any_embedded = chunks.iter().any(|c| c.embedding.is_some());

    if any_embedded && embedder.is_enabled() {
        let vectors = embedder.embed(&[query.to_string()]).await?;
        let query_vec = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;
        return Ok((
            RetrievalMode::Semantic,
            rank_by_similarity(&query_vec, chunks, limit),
        ));
    }

    Ok((
        RetrievalMode::Substring,
        substring_matches(query, chunks, limit),
    ))
}

/// Build source attributions, clipping each snippet to `snippet_chars`.
pub fn to_sources(results: &[ScoredChunk], snippet_chars: usize) -> Vec<Source> {
    results
        .iter()
        .map(|r| Source {
            document_id: r.chunk.document_id.clone(),
            chunk_id: r.chunk.id.clone(),
            snippet: r.chunk.text.chars().take(snippet_chars).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn chunk(id: &str, text: &str, embedding: Option<Vec<f32>>) -> Chunk {
        Chunk {
            id: id.to_string(),
            document_id: "d1".to_string(),
            chunk_index: 0,
            text: text.to_string(),
            embedding,
        }
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| self.0.clone()).collect())
        }
    }

    #[test]
    fn test_rank_by_similarity_orders_and_limits() {
        let chunks = vec![
            chunk("far", "x", Some(vec![0.0, 1.0])),
            chunk("near", "y", Some(vec![1.0, 0.1])),
            chunk("mid", "z", Some(vec![1.0, 1.0])),
            chunk("none", "w", None),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], chunks, 2);
        let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
    }

    #[test]
    fn test_rank_ties_keep_scan_order() {
        let chunks = vec![
            chunk("first", "a", Some(vec![1.0, 0.0])),
            chunk("second", "b", Some(vec![2.0, 0.0])),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], chunks, 5);
        assert_eq!(ranked[0].chunk.id, "first");
        assert_eq!(ranked[1].chunk.id, "second");
    }

    #[test]
    fn test_substring_case_insensitive_shortest_first() {
        let chunks = vec![
            chunk("long", "The PAYROLL policy covers many many things", None),
            chunk("miss", "Holiday schedule", None),
            chunk("short", "payroll dates", None),
        ];
        let hits = substring_matches("Payroll", chunks, 5);
        let ids: Vec<&str> = hits.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["short", "long"]);
        assert!(hits.iter().all(|h| h.score.is_none()));
    }

    #[test]
    fn test_to_sources_clips_snippet() {
        let results = vec![ScoredChunk {
            chunk: chunk("c1", &"é".repeat(10), None),
            score: None,
        }];
        let sources = to_sources(&results, 4);
        assert_eq!(sources[0].snippet, "éééé");
        assert_eq!(sources[0].chunk_id, "c1");
    }

    #[tokio::test]
    async fn test_retrieve_falls_back_without_embeddings() {
        use crate::models::Document;
        use crate::store::memory::InMemoryStore;

        let store = InMemoryStore::new();
        store
            .insert_document(&Document {
                id: "d1".into(),
                uploader_id: "u".into(),
                filename: "a.txt".into(),
                content_type: "text/plain".into(),
                storage_path: String::new(),
                size: 1,
                content_hash: "h".into(),
                doc_embedding: None,
                created_at: 0,
            })
            .await
            .unwrap();
        store
            .insert_chunks(&[chunk("c1", "alpha beta", None)])
            .await
            .unwrap();

        let embedder = FixedEmbedder(vec![1.0, 0.0]);
        let (mode, hits) = retrieve(&store, &embedder, "BETA", 5).await.unwrap();
        assert_eq!(mode, RetrievalMode::Substring);
        assert_eq!(hits.len(), 1);
    }
}
