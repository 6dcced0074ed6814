//! Document slot: the single file served for `/`
//!
//! The slot is a fixed path plus a sibling temporary path used while an
//! upload is swapped in. Only the upload handler mutates it.
//!
//! With [`SwapStrategy::DeleteThenRename`] a concurrent `GET /` that lands
//! between the delete and the rename sees no document and gets a 404.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default document file name
pub const DEFAULT_DOCUMENT: &str = "index.html";

/// Default temporary file name used during a swap
pub const DEFAULT_TEMP_DOCUMENT: &str = "index-update.html";

/// How an uploaded payload replaces the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapStrategy {
    /// Write temp, delete document, rename temp. Leaves a window with no document.
    #[default]
    DeleteThenRename,
    /// Write temp, rename it over the document. No missing-file window.
    RenameOver,
}

/// Failure while swapping a new document in
#[derive(Debug, Error)]
pub enum SwapError {
    /// The temporary file could not be written, document untouched
    #[error("failed to write temporary file {}: {source}", .path.display())]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The current document could not be deleted, document untouched
    #[error("failed to delete current document {}: {source}", .path.display())]
    RemoveDocument {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Rename failed after the old document was deleted: nothing is served
    #[error("document {} lost: rename from temporary file failed after delete: {source}", .path.display())]
    DocumentLost {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Rename over the document failed, old document still in place
    #[error("failed to rename temporary file over {}: {source}", .path.display())]
    Rename {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SwapError {
    /// True when the document is no longer on disk
    pub fn document_lost(&self) -> bool {
        matches!(self, SwapError::DocumentLost { .. })
    }
}

/// The served document
#[derive(Debug, Clone)]
pub struct DocumentSlot {
    path: PathBuf,
    temp_path: PathBuf,
    strategy: SwapStrategy,
}

impl DocumentSlot {
    /// Slot for `root/name`, swapping through `root/temp_name`
    pub fn new(root: impl AsRef<Path>, name: &str, temp_name: &str) -> Self {
        let root = root.as_ref();
        Self {
            path: root.join(name),
            temp_path: root.join(temp_name),
            strategy: SwapStrategy::default(),
        }
    }

    /// Slot with the default `index.html` / `index-update.html` names
    pub fn in_dir(root: impl AsRef<Path>) -> Self {
        Self::new(root, DEFAULT_DOCUMENT, DEFAULT_TEMP_DOCUMENT)
    }

    pub fn strategy(mut self, strategy: SwapStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn swap_strategy(&self) -> SwapStrategy {
        self.strategy
    }

    /// True if the slot currently resolves to a regular file
    pub async fn exists(&self) -> bool {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Replace the document with `payload`
    pub async fn swap(&self, payload: &[u8]) -> Result<(), SwapError> {
        tokio::fs::write(&self.temp_path, payload)
            .await
            .map_err(|source| SwapError::WriteTemp {
                path: self.temp_path.clone(),
                source,
            })?;
        debug!(path = %self.temp_path.display(), bytes = payload.len(), "wrote temporary document");

        match self.strategy {
            SwapStrategy::DeleteThenRename => {
                match tokio::fs::remove_file(&self.path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(SwapError::RemoveDocument {
                            path: self.path.clone(),
                            source,
                        })
                    }
                }

                tokio::fs::rename(&self.temp_path, &self.path)
                    .await
                    .map_err(|source| SwapError::DocumentLost {
                        path: self.path.clone(),
                        source,
                    })
            }
            SwapStrategy::RenameOver => tokio::fs::rename(&self.temp_path, &self.path)
                .await
                .map_err(|source| SwapError::Rename {
                    path: self.path.clone(),
                    source,
                }),
        }
    }
}
