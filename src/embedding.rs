//! Embedding provider implementations.
//!
//! Concrete [`Embedder`] backends selected by `[embedding] provider`:
//! - **[`DisabledEmbedder`]**: reports itself disabled; ingestion then stores
//!   chunks without vectors and retrieval falls back to substring search.
//! - **[`OpenAIEmbedder`]**: calls `POST /v1/embeddings`, batching inputs.
//! - **[`OllamaEmbedder`]**: calls a local Ollama instance's `/api/embed`.
//!
//! Network providers share the retry policy in [`crate::upstream`].
//!
//! ```rust,no_run
//! # use curie::config::EmbeddingConfig;
//! # use curie::embedding::create_embedder;
//! let config = EmbeddingConfig::default(); // provider = "disabled"
//! let embedder = create_embedder(&config).unwrap();
//! assert!(!embedder.is_enabled());
//! ```

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use curie_core::embedding::Embedder;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::upstream::JsonEndpoint;

const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
const OLLAMA_DEFAULT_BASE: &str = "http://localhost:11434";

// ============ Disabled Provider ============

/// A no-op embedder used when `embedding.provider = "disabled"`.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI Provider ============

/// Embedder using the OpenAI embeddings API (or a compatible server).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    model: String,
    batch_size: usize,
    endpoint: JsonEndpoint,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        let base = config.url.as_deref().unwrap_or(OPENAI_DEFAULT_BASE);
        let endpoint = JsonEndpoint::new(
            format!("{}/embeddings", base.trim_end_matches('/')),
            config.timeout_secs,
            config.max_retries,
            "OpenAI",
        )?
        .with_bearer(api_key);
        Ok(Self {
            model,
            batch_size: config.batch_size.max(1),
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(model = %self.model, batch = batch.len(), "embedding batch");
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.endpoint.post(&body).await?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());

    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .unwrap_or(pos as u64);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing embedding"))?;

        embeddings.push((index, parse_vector(embedding, "OpenAI")?));
    }

    embeddings.sort_by_key(|(index, _)| *index);
    Ok(embeddings.into_iter().map(|(_, v)| v).collect())
}

/// Every element must be a number; a malformed vector is an error, not zeros.
fn parse_vector(values: &[serde_json::Value], provider: &str) -> Result<Vec<f32>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                anyhow::anyhow!("Invalid {} response: non-numeric embedding value {}", provider, v)
            })
        })
        .collect()
}

// ============ Ollama Provider ============

/// Embedder using a local Ollama instance.
pub struct OllamaEmbedder {
    model: String,
    batch_size: usize,
    endpoint: JsonEndpoint,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let base = config.url.as_deref().unwrap_or(OLLAMA_DEFAULT_BASE);
        let endpoint = JsonEndpoint::new(
            format!("{}/api/embed", base.trim_end_matches('/')),
            config.timeout_secs,
            config.max_retries,
            "Ollama",
        )?;
        Ok(Self {
            model,
            batch_size: config.batch_size.max(1),
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = self.endpoint.post(&body).await?;
            out.extend(parse_ollama_response(&json)?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing embeddings array"))?;

    let mut result = Vec::with_capacity(embeddings.len());

    for embedding in embeddings {
        let values = embedding
            .as_array()
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: embedding is not an array"))?;
        result.push(parse_vector(values, "Ollama")?);
    }

    Ok(result)
}

/// Create the configured [`Embedder`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_openai_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn parse_openai_missing_data_is_error() {
        assert!(parse_openai_response(&serde_json::json!({"error": "x"})).is_err());
    }

    #[test]
    fn parse_openai_non_numeric_value_is_error() {
        let json = serde_json::json!({
            "data": [{"index": 0, "embedding": [0.5, "oops", 0.1]}]
        });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(err.to_string().contains("Invalid OpenAI response"));
    }

    #[test]
    fn parse_ollama_non_numeric_value_is_error() {
        let json = serde_json::json!({"embeddings": [[0.5, null]]});
        assert!(parse_ollama_response(&json).is_err());
    }

    #[test]
    fn parse_ollama_embeddings() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.5], [1.0, 0.0]]});
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0], vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn disabled_embedder_refuses() {
        let embedder = create_embedder(&EmbeddingConfig::default()).unwrap();
        assert!(!embedder.is_enabled());
        assert!(embedder.embed(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn ollama_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_embedder(&config).is_err());
    }
}
