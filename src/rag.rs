//! Retrieval-augmented answers over the ingested corpus.
//!
//! Retrieval itself is [`curie_core::search::retrieve`]; this module turns
//! the retrieved chunks into one grounded completion call and a source list.

use curie_core::error::{Error, Result};
use curie_core::llm::{CompletionOptions, PromptMessage};
use curie_core::models::RagAnswer;
use curie_core::search::{retrieve, to_sources, ScoredChunk};
use tracing::debug;

use crate::context::ServiceContext;

pub const NO_DOCUMENTS_ANSWER: &str = "No relevant documents found.";
pub const EMPTY_ANSWER: &str = "I couldn't form an answer.";

const CONTEXT_SEPARATOR: &str = "\n---\n";
const SYSTEM_PROMPT: &str =
    "You answer using ONLY the provided context. If you don't see the answer, say so.";

/// Answer `query` from the top `limit` chunks.
///
/// With nothing retrieved the canned [`NO_DOCUMENTS_ANSWER`] is returned
/// and the model is not called.
pub async fn answer_query(ctx: &ServiceContext, query: &str, limit: usize) -> Result<RagAnswer> {
    let (mode, results) = retrieve(ctx.documents.as_ref(), ctx.embedder.as_ref(), query, limit)
        .await
        .map_err(|e| Error::Upstream(format!("retrieval failed: {e:#}")))?;
    debug!(?mode, hits = results.len(), "retrieved chunks");

    if results.is_empty() {
        return Ok(RagAnswer {
            answer: NO_DOCUMENTS_ANSWER.to_string(),
            sources: Vec::new(),
        });
    }

    let messages = build_prompt(query, &results);
    let reply = ctx
        .llm
        .complete(&messages, CompletionOptions::default())
        .await
        .map_err(|e| Error::Upstream(format!("answer generation failed: {e:#}")))?;

    let answer = if reply.trim().is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        reply
    };

    Ok(RagAnswer {
        answer,
        sources: to_sources(&results, ctx.config.retrieval.snippet_chars),
    })
}

fn build_prompt(query: &str, results: &[ScoredChunk]) -> Vec<PromptMessage> {
    let context = results
        .iter()
        .map(|r| r.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);
    vec![
        PromptMessage::system(SYSTEM_PROMPT),
        PromptMessage::user(format!("Context:\n{}\n\nQuestion: {}", context, query)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use curie_core::models::{Chunk, Role};

    fn scored(text: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                id: "c".into(),
                document_id: "d".into(),
                chunk_index: 0,
                text: text.into(),
                embedding: None,
            },
            score: None,
        }
    }

    #[test]
    fn prompt_joins_context_with_separator() {
        let messages = build_prompt("when?", &[scored("first"), scored("second")]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[1].content,
            "Context:\nfirst\n---\nsecond\n\nQuestion: when?"
        );
    }
}
