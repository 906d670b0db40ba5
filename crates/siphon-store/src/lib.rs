#![forbid(unsafe_code)]

//! `siphon-store`
//!
//! Durable cache layout for the siphon gateway:
//! - content-addressed blob store with crash-safe temp-file → rename commits
//! - revision ref files mapping mutable tokens to content-set ids
//! - snapshot directories of symlink entries resolving into the blob store
//! - model index documents, loaded from disk or synthesized by a walk
//! - the [`Distribution`] facade consumed by the HTTP layer

use siphon_core::CoreError;
use thiserror::Error;

mod blob;
mod distribution;
mod index;
mod layout;
mod refs;
mod snapshot;

pub use blob::{BlobStore, BlobWriter};
pub use distribution::{
    open_distribution, Distribution, EntryStat, LocalStore, StorageKind, VcsStore,
};
pub use index::{ModelIndex, ModelIndexInfo, SiblingFile};
pub use layout::{EntryPath, RepoLayout};
pub use refs::RefStore;
pub use snapshot::SnapshotIndex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Invalid cache path: {0}")]
    InvalidPath(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("File not found: {model}/{filename}")]
    FileNotFound { model: String, filename: String },

    #[error("Blob not found: {model}@{etag}")]
    BlobNotFound { model: String, etag: String },

    #[error("Ref not found: {model}@{revision}")]
    RefNotFound { model: String, revision: String },

    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}

impl StoreError {
    /// Whether this error means "the thing does not exist" rather than a
    /// storage failure. Used by the HTTP layer for 404 mapping.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ModelNotFound(_)
                | Self::FileNotFound { .. }
                | Self::BlobNotFound { .. }
                | Self::RefNotFound { .. }
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
