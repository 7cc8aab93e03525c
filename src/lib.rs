//! # Curie
//!
//! A chat backend that answers questions from an ingested document corpus
//! and opens single-use widgets for resume matching and template filling.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────┐
//! │   Upload    │──▶│ Extract + Dedupe │──▶│  SQLite  │
//! │ (HTTP/CLI)  │   │ Chunk + Embed    │   │ + blobs  │
//! └─────────────┘   └──────────────────┘   └────┬─────┘
//!                                               │
//!                  ┌────────────────────────────┤
//!                  ▼                            ▼
//!          ┌───────────────┐            ┌──────────────┐
//!          │ Conversation  │──intent──▶ │ RAG / Widget │
//!          │    engine     │            │  executors   │
//!          └───────────────┘            └──────────────┘
//! ```
//!
//! Domain types, the store traits, the dedupe engine and ranking live in
//! the `curie-core` crate; this crate wires them to SQLite, HTTP model
//! providers, the filesystem and axum.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite implementation of the store traits |
//! | [`storage`] | Blob storage for uploaded files |
//! | [`extract`] | Cascading text extraction |
//! | [`upstream`] | Retrying JSON client for model APIs |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Chat-completion client |
//! | [`context`] | Shared service collaborators |
//! | [`ingest`] | Document ingestion pipeline |
//! | [`rag`] | Retrieval-augmented answers |
//! | [`conversation`] | Sessions, message routing, widget lifecycle |
//! | [`summary`] | Rolling session summaries |
//! | [`widgets`] | Resume-match and doc-gen executors |
//! | [`accounts`] | Role-based capability checks |
//! | [`server`] | HTTP server |

pub mod accounts;
pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod migrate;
pub mod rag;
pub mod server;
pub mod sqlite_store;
pub mod storage;
pub mod summary;
pub mod upstream;
pub mod widgets;
