//! Blob storage on the local filesystem.
//!
//! Files live under a single root, namespaced by purpose:
//!
//! ```text
//! <root>/rag_documents/<filename>
//! <root>/chat_data/session_<sid>/message_<mid>/upload_files/<filename>
//! ```
//!
//! Writing to an existing path overwrites it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub const DOCUMENTS_DIR: &str = "rag_documents";
pub const CHAT_DATA_DIR: &str = "chat_data";

#[derive(Debug, Clone)]
pub struct BlobStorage {
    root: PathBuf,
}

/// Where a blob ended up and how large it is.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedBlob {
    pub path: PathBuf,
    pub size: u64,
}

impl BlobStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root, made absolute when possible.
    pub fn resolve_root(&self) -> PathBuf {
        std::fs::canonicalize(&self.root).unwrap_or_else(|_| self.root.clone())
    }

    /// Write `bytes` at `relative` under the root, creating directories.
    pub async fn save(&self, relative: &Path, bytes: &[u8]) -> Result<SavedBlob> {
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            bail!("blob path must stay inside the storage root: {}", relative.display());
        }
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(SavedBlob {
            path,
            size: bytes.len() as u64,
        })
    }

    pub fn document_path(filename: &str) -> PathBuf {
        Path::new(DOCUMENTS_DIR).join(safe_filename(filename))
    }

    pub fn chat_upload_path(session_id: &str, message_id: &str, filename: &str) -> PathBuf {
        Path::new(CHAT_DATA_DIR)
            .join(format!("session_{}", safe_filename(session_id)))
            .join(format!("message_{}", safe_filename(message_id)))
            .join("upload_files")
            .join(safe_filename(filename))
    }
}

/// Keep only the final path component of a client-supplied name.
pub fn safe_filename(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or_default().trim();
    match base {
        "" | "." | ".." => "upload.bin".to_string(),
        other => other.to_string(),
    }
}
