//! # Curie Core
//!
//! Shared logic for Curie: data models, chunking, vector utilities,
//! duplicate detection, retrieval ranking, the store and model traits,
//! and the error taxonomy.
//!
//! This crate contains no tokio, sqlx, HTTP clients or filesystem I/O.
//! Backends live in the `curie` app crate.

pub mod chunk;
pub mod dedupe;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod store;
