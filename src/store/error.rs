//! Typed failures surfaced by the content store.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::ContentId;

/// Result alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Every failure a store operation can signal
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Content not found: {id}")]
    ContentNotFound { id: ContentId },

    #[error("File not found in content {id}: {path}")]
    FileNotFound { id: ContentId, path: String },

    #[error("No free content id after {attempts} attempts")]
    IdExhaustion { attempts: u32 },

    #[error("Failed to create content {id}: {source}")]
    ContentCreation {
        id: ContentId,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Storage I/O error at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Path escapes the content file area: {0}")]
    PathTraversal(String),

    #[error("Path is reserved for the primary content document: {0}")]
    ReservedPath(String),
}

impl StoreError {
    /// Wrap an I/O error with the path it happened at
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::StorageIo {
            path: path.into(),
            source,
        }
    }

    /// True for both content and file not-found errors
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::ContentNotFound { .. } | StoreError::FileNotFound { .. }
        )
    }
}
