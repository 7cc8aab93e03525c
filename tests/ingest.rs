//! Ingestion and retrieval over a real SQLite store.

mod common;

use std::sync::Arc;

use common::{no_embedder, sqlite_context, MarkerEmbedder, ScriptedModel};
use curie::{ingest, rag};
use curie_core::chunk::EMPTY_CHUNK_PLACEHOLDER;
use curie_core::error::{Conflict, Error};
use tempfile::TempDir;

fn marker_embedder() -> Arc<MarkerEmbedder> {
    Arc::new(MarkerEmbedder::new(vec![
        ("alpha", vec![1.0, 0.0, 0.0]),
        // cosine 0.9 against alpha
        ("gamma", vec![0.9, 0.435_889_9, 0.0]),
        // cosine 0.5 against alpha
        ("delta", vec![0.5, 0.866_025_4, 0.0]),
    ]))
}

#[tokio::test]
async fn test_exact_duplicate_reports_existing_id() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", no_embedder(), ScriptedModel::new()).await;

    let text = b"Alpha handbook: payroll runs on the 25th.";
    let first = ingest::ingest(&ctx, "admin", "a.txt", "text/plain", text)
        .await
        .unwrap();

    // Same normalized text under another name and with different spacing.
    let err = ingest::ingest(
        &ctx,
        "admin",
        "copy.txt",
        "text/plain",
        b"ALPHA handbook:   payroll runs on the 25th.\n",
    )
    .await
    .unwrap_err();
    match err {
        Error::Conflict(Conflict::ExactDuplicate { existing_id }) => {
            assert_eq!(existing_id.as_deref(), Some(first.id.as_str()));
        }
        other => panic!("expected exact duplicate, got {other:?}"),
    }
    assert_eq!(ingest::list_documents(&ctx).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_semantic_duplicate_threshold() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", marker_embedder(), ScriptedModel::new()).await;

    let first = ingest::ingest(&ctx, "admin", "alpha.txt", "text/plain", b"alpha report")
        .await
        .unwrap();
    assert!(first.doc_embedding.is_some());

    let err = ingest::ingest(&ctx, "admin", "gamma.txt", "text/plain", b"gamma report")
        .await
        .unwrap_err();
    match err {
        Error::Conflict(Conflict::SemanticDuplicate {
            existing_id,
            similarity,
        }) => {
            assert_eq!(existing_id, first.id);
            assert!((similarity - 0.9).abs() < 1e-3, "similarity {similarity}");
        }
        other => panic!("expected semantic duplicate, got {other:?}"),
    }

    ingest::ingest(&ctx, "admin", "delta.txt", "text/plain", b"delta report")
        .await
        .unwrap();
    assert_eq!(ingest::list_documents(&ctx).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_blank_upload_is_unparseable() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", no_embedder(), ScriptedModel::new()).await;

    let err = ingest::ingest(&ctx, "admin", "empty.txt", "text/plain", b"  \n\t ")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnparseableInput(_)));
    assert_eq!(err.code(), "unparseable_input");
}

#[tokio::test]
async fn test_chunks_are_stored_in_order_without_nul_bytes() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "[chunking]\nmax_chars = 20", no_embedder(), ScriptedModel::new()).await;

    let body = format!(
        "first line here\nsec\0ond line here\n{}\nlast line here",
        "\0".repeat(10)
    );
    let doc = ingest::ingest(&ctx, "admin", "nul.txt", "text/plain", body.as_bytes())
        .await
        .unwrap();

    let chunks = ctx.documents.document_chunks(&doc.id).await.unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["first line here", "second line here", EMPTY_CHUNK_PLACEHOLDER, "last line here"]
    );
    let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3]);
    assert!(chunks.iter().all(|c| c.embedding.is_none()));
    assert!(doc.doc_embedding.is_none());
}

#[tokio::test]
async fn test_raw_file_is_stored_under_documents_dir() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", no_embedder(), ScriptedModel::new()).await;

    let doc = ingest::ingest(&ctx, "admin", "../../escape.txt", "text/plain", b"stored bytes")
        .await
        .unwrap();
    let expected = tmp.path().join("storage").join("rag_documents").join("escape.txt");
    assert_eq!(std::fs::read(&expected).unwrap(), b"stored bytes");
    assert_eq!(doc.size, 12);
    assert_eq!(doc.storage_path, expected.display().to_string());
}

#[tokio::test]
async fn test_delete_document_cascades() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", no_embedder(), ScriptedModel::new()).await;

    let doc = ingest::ingest(&ctx, "admin", "a.txt", "text/plain", b"to be removed")
        .await
        .unwrap();
    ingest::delete_document(&ctx, &doc.id).await.unwrap();

    assert!(ctx.documents.all_chunks().await.unwrap().is_empty());
    assert!(matches!(
        ingest::get_document(&ctx, &doc.id).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(
        ingest::delete_document(&ctx, &doc.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_substring_fallback_ranks_shorter_chunks_first() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::new();
    let ctx = sqlite_context(&tmp, "", no_embedder(), model.clone()).await;

    ingest::ingest(
        &ctx,
        "admin",
        "long.txt",
        "text/plain",
        b"The payroll calendar lists every payday for the whole fiscal year.",
    )
    .await
    .unwrap();
    ingest::ingest(&ctx, "admin", "short.txt", "text/plain", b"Payroll: 25th")
        .await
        .unwrap();
    ingest::ingest(&ctx, "admin", "other.txt", "text/plain", b"Holiday schedule")
        .await
        .unwrap();

    let answer = rag::answer_query(&ctx, "PAYROLL", 5).await.unwrap();
    assert_eq!(answer.answer, "ANSWER");
    let snippets: Vec<&str> = answer.sources.iter().map(|s| s.snippet.as_str()).collect();
    assert_eq!(
        snippets,
        vec![
            "Payroll: 25th",
            "The payroll calendar lists every payday for the whole fiscal year."
        ]
    );

    let calls = model.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(calls[0][1]
        .content
        .starts_with("Context:\nPayroll: 25th\n---\nThe payroll calendar"));
}

#[tokio::test]
async fn test_no_results_skips_the_model() {
    let tmp = TempDir::new().unwrap();
    let model = ScriptedModel::new();
    let ctx = sqlite_context(&tmp, "", no_embedder(), model.clone()).await;

    let answer = rag::answer_query(&ctx, "anything", 5).await.unwrap();
    assert_eq!(answer.answer, rag::NO_DOCUMENTS_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_semantic_retrieval_orders_by_similarity() {
    let tmp = TempDir::new().unwrap();
    let ctx = sqlite_context(&tmp, "", marker_embedder(), ScriptedModel::new()).await;

    let alpha = ingest::ingest(&ctx, "admin", "alpha.txt", "text/plain", b"alpha notes")
        .await
        .unwrap();
    let delta = ingest::ingest(&ctx, "admin", "delta.txt", "text/plain", b"delta notes")
        .await
        .unwrap();

    let answer = rag::answer_query(&ctx, "tell me about alpha", 1).await.unwrap();
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].document_id, alpha.id);

    let answer = rag::answer_query(&ctx, "delta?", 2).await.unwrap();
    assert_eq!(answer.sources[0].document_id, delta.id);
    assert_eq!(answer.sources[1].document_id, alpha.id);
}
