//! Shared fixtures: a temp-dir SQLite context and deterministic model fakes.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use curie::config::Config;
use curie::context::ServiceContext;
use curie::embedding::DisabledEmbedder;
use curie::sqlite_store::SqliteStore;
use curie::{db, migrate};
use curie_core::embedding::Embedder;
use curie_core::llm::{ChatModel, CompletionOptions, PromptMessage};
use tempfile::TempDir;

/// Config rooted in `tmp`. `extra` is appended verbatim; a `[server]`
/// table in it replaces the default one.
pub fn test_config(tmp: &TempDir, extra: &str) -> Config {
    let server = if extra.contains("[server]") {
        ""
    } else {
        "[server]\nbind = \"127.0.0.1:0\"\n"
    };
    let body = format!(
        r#"
[db]
path = "{root}/data/curie.sqlite"

[storage]
root = "{root}/storage"

{server}
{extra}
"#,
        root = tmp.path().display(),
        server = server,
        extra = extra,
    );
    let config: Config = toml::from_str(&body).unwrap();
    curie::config::validate(&config).unwrap();
    config
}

pub async fn sqlite_context(
    tmp: &TempDir,
    extra_config: &str,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
) -> ServiceContext {
    let config = test_config(tmp, extra_config);
    let pool = db::connect(&config).await.unwrap();
    migrate::apply_schema(&pool).await.unwrap();
    ServiceContext::with_store(config, Arc::new(SqliteStore::new(pool)), embedder, llm)
}

pub fn no_embedder() -> Arc<dyn Embedder> {
    Arc::new(DisabledEmbedder)
}

/// Maps text to a fixed vector by the first marker word it contains.
pub struct MarkerEmbedder {
    table: Vec<(&'static str, Vec<f32>)>,
    fallback: Vec<f32>,
}

impl MarkerEmbedder {
    pub fn new(table: Vec<(&'static str, Vec<f32>)>) -> Self {
        Self {
            table,
            fallback: vec![0.0, 0.0, 1.0],
        }
    }
}

#[async_trait]
impl Embedder for MarkerEmbedder {
    fn model_name(&self) -> &str {
        "marker"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                self.table
                    .iter()
                    .find(|(marker, _)| lower.contains(marker))
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

/// A chat model that answers by recognising which prompt it was given.
///
/// - intent classifier: `resume`/`cv` → resume_match, `template` → doc_gen,
///   otherwise rag
/// - resume screening: a fixed score of 75
/// - summarizer: `"SUMMARY"`, or an error when `fail_summaries` is set
/// - anything else: `"ANSWER"`
#[derive(Default)]
pub struct ScriptedModel {
    pub calls: Mutex<Vec<Vec<PromptMessage>>>,
    pub fail_summaries: bool,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_summaries() -> Arc<Self> {
        Arc::new(Self {
            fail_summaries: true,
            ..Self::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Number of calls whose first message starts with `prefix`.
    pub fn calls_starting_with(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.first().is_some_and(|m| m.content.starts_with(prefix)))
            .count()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[PromptMessage], _options: CompletionOptions) -> Result<String> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let first = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
        let last = messages.last().map(|m| m.content.to_lowercase()).unwrap_or_default();

        if first.starts_with("You are an intent classifier") {
            let intent = if last.contains("resume") || last.contains("cv") {
                "resume_match"
            } else if last.contains("template") {
                "doc_gen"
            } else {
                "rag"
            };
            return Ok(format!(r#"{{"intent": "{}"}}"#, intent));
        }
        if first.starts_with("You are a resume screening assistant") {
            return Ok(r#"{"match": 75, "reason": "solid", "strengths": ["rust"], "weaknesses": []}"#.into());
        }
        if first.starts_with("You are a chat history summarizer") {
            if self.fail_summaries {
                bail!("summarizer unavailable");
            }
            return Ok("SUMMARY".into());
        }
        Ok("ANSWER".into())
    }
}
