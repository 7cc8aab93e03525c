//! Error taxonomy shared by every Curie service entry point.
//!
//! Store traits and outbound clients work in `anyhow::Result`; the service
//! layer narrows those into [`Error`] so callers (HTTP, CLI) can map each
//! variant to a stable client-visible category.

use thiserror::Error;

use crate::models::{ToolKind, ToolStatus};

/// Main error type for Curie operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Session, invocation or document is absent or not owned by the caller.
    #[error("not found: {0}")]
    NotFound(String),

    /// Business-rule conflict (duplicates, consumed invocations).
    #[error("conflict: {0}")]
    Conflict(#[from] Conflict),

    /// Uploaded content produced no usable text.
    #[error("unparseable input: {0}")]
    UnparseableInput(String),

    /// Caller lacks the role required for the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Embedding or chat-completion call failed with no local fallback.
    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Conflict details, carrying the clashing entity for diagnosis.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Conflict {
    /// Same normalized-text hash already stored. `existing_id` is `None`
    /// only when a concurrent insert won and could not be re-read.
    #[error("exact duplicate of document {}", existing_id.as_deref().unwrap_or("<unknown>"))]
    ExactDuplicate { existing_id: Option<String> },

    #[error("semantic duplicate of document {existing_id} (similarity {similarity:.3})")]
    SemanticDuplicate {
        existing_id: String,
        similarity: f32,
    },

    #[error("tool invocation {invocation_id} is already {status}")]
    InvocationConsumed {
        invocation_id: String,
        status: ToolStatus,
    },

    #[error("tool invocation {invocation_id} is {actual}, not {expected}")]
    KindMismatch {
        invocation_id: String,
        expected: ToolKind,
        actual: ToolKind,
    },
}

impl Error {
    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Conflict(Conflict::ExactDuplicate { .. }) => "exact_duplicate",
            Error::Conflict(Conflict::SemanticDuplicate { .. }) => "semantic_duplicate",
            Error::Conflict(Conflict::InvocationConsumed { .. }) => "invocation_consumed",
            Error::Conflict(Conflict::KindMismatch { .. }) => "kind_mismatch",
            Error::UnparseableInput(_) => "unparseable_input",
            Error::Forbidden(_) => "forbidden",
            Error::InvalidRequest(_) => "invalid_request",
            Error::Upstream(_) => "upstream_failure",
            Error::Internal(_) => "internal",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }
}

/// Result type alias for Curie operations.
pub type Result<T> = std::result::Result<T, Error>;
