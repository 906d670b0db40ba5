use std::path::{Path, PathBuf};

use siphon_core::ModelId;

use crate::{StoreError, StoreResult};

/// Safe relative path for a snapshot entry or uploaded file.
/// No `..`, no absolute paths, no empty segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntryPath {
    segments: Vec<String>,
}

impl EntryPath {
    pub fn new(raw: &str) -> StoreResult<Self> {
        if raw.is_empty() {
            return Err(StoreError::InvalidPath("empty path".to_string()));
        }
        let mut segments = Vec::new();
        for segment in raw.split('/') {
            if segment.is_empty() {
                return Err(StoreError::InvalidPath(format!(
                    "empty segment in {raw:?}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(StoreError::InvalidPath(format!(
                    "relative segment in {raw:?}"
                )));
            }
            if segment.contains('\\') {
                return Err(StoreError::InvalidPath(format!(
                    "path separator in segment of {raw:?}"
                )));
            }
            segments.push(segment.to_string());
        }
        Ok(EntryPath { segments })
    }

    pub fn as_rel_path(&self) -> PathBuf {
        self.segments.iter().collect()
    }

    pub fn as_str(&self) -> String {
        self.segments.join("/")
    }

    /// Last segment, the plain file name.
    pub fn file_name(&self) -> &str {
        self.segments
            .last()
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Number of directory levels above the file itself.
    pub fn depth(&self) -> usize {
        self.segments.len().saturating_sub(1)
    }
}

/// Validate a token (etag, sha, revision) that becomes a single file or
/// directory name on disk.
pub(crate) fn validate_token(kind: &str, token: &str) -> StoreResult<()> {
    if token.is_empty()
        || token == "."
        || token == ".."
        || token.contains('/')
        || token.contains('\\')
    {
        return Err(StoreError::InvalidPath(format!("invalid {kind}: {token:?}")));
    }
    Ok(())
}

/// Filesystem layout of the cache.
///
/// All paths derive from `<root>/hub/<encoded-model-id>/`:
///
/// ```text
/// refs/<revision>                 content-set id
/// blobs/<etag>                    raw file bytes
/// snapshots/<sha>/<filename>      symlink into ../../blobs/<etag>
/// .modeindex                      JSON model index document
/// ```
#[derive(Clone, Debug)]
pub struct RepoLayout {
    base_dir: PathBuf,
}

impl RepoLayout {
    /// Open the layout rooted at `root`, creating `<root>/hub` if absent.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let base_dir = root.into().join("hub");
        std::fs::create_dir_all(&base_dir)?;
        Ok(RepoLayout { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn repo_dir(&self, model: &ModelId) -> PathBuf {
        self.base_dir.join(model.repo_dirname())
    }

    pub fn blobs_dir(&self, model: &ModelId) -> PathBuf {
        self.repo_dir(model).join("blobs")
    }

    pub fn blob_path(&self, model: &ModelId, etag: &str) -> PathBuf {
        self.blobs_dir(model).join(etag)
    }

    pub fn refs_dir(&self, model: &ModelId) -> PathBuf {
        self.repo_dir(model).join("refs")
    }

    pub fn ref_path(&self, model: &ModelId, revision: &str) -> PathBuf {
        self.refs_dir(model).join(revision)
    }

    pub fn snapshots_dir(&self, model: &ModelId) -> PathBuf {
        self.repo_dir(model).join("snapshots")
    }

    pub fn snapshot_dir(&self, model: &ModelId, sha: &str) -> PathBuf {
        self.snapshots_dir(model).join(sha)
    }

    pub fn snapshot_path(&self, model: &ModelId, sha: &str, entry: &EntryPath) -> PathBuf {
        self.snapshot_dir(model, sha).join(entry.as_rel_path())
    }

    pub fn index_path(&self, model: &ModelId) -> PathBuf {
        self.repo_dir(model).join(".modeindex")
    }
}
