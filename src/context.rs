//! Collaborators shared by every service operation.
//!
//! A [`ServiceContext`] is built once (from config for the CLI and server,
//! or from in-memory fakes in tests) and passed by reference into the
//! ingestion, retrieval, conversation and widget services. It holds no
//! per-request state.

use std::sync::Arc;

use anyhow::Result;
use curie_core::embedding::Embedder;
use curie_core::llm::ChatModel;
use curie_core::store::{AccountStore, ChatStore, DocumentStore};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::ExtractorChain;
use crate::llm::create_chat_model;
use crate::migrate;
use crate::sqlite_store::SqliteStore;
use crate::storage::BlobStorage;

pub struct ServiceContext {
    pub config: Config,
    pub documents: Arc<dyn DocumentStore>,
    pub chats: Arc<dyn ChatStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn ChatModel>,
    pub blobs: BlobStorage,
    pub extractors: Arc<ExtractorChain>,
}

impl ServiceContext {
    /// Connect to SQLite (creating the schema if needed) and build the
    /// configured providers.
    pub async fn from_config(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        migrate::apply_schema(&pool).await?;
        let store = Arc::new(SqliteStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_chat_model(&config.llm)?;
        Ok(Self::with_store(config, store, embedder, llm))
    }

    /// Assemble a context around one store implementing every store trait.
    pub fn with_store<S>(
        config: Config,
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
    ) -> Self
    where
        S: DocumentStore + ChatStore + AccountStore + 'static,
    {
        let blobs = BlobStorage::new(config.storage.root.clone());
        Self {
            config,
            documents: store.clone(),
            chats: store.clone(),
            accounts: store,
            embedder,
            llm,
            blobs,
            extractors: Arc::new(ExtractorChain::default()),
        }
    }
}

/// Current time as Unix seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
