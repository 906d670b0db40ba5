use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use siphon_core::ModelId;
use tempfile::NamedTempFile;

use crate::{
    BlobStore, EntryPath, ModelIndex, ModelIndexInfo, RefStore, RepoLayout, SnapshotIndex,
    StoreError, StoreResult,
};

/// Minimal stat for a located snapshot entry.
#[derive(Clone, Debug)]
pub struct EntryStat {
    pub file_name: String,
    pub size: u64,
}

/// Uniform read/write contract consumed by the HTTP routing layer.
pub trait Distribution: Send + Sync {
    /// Direct write into the repo dir, bypassing proxy capture.
    fn store_file(
        &self,
        model: &ModelId,
        filename: &str,
        content: &mut dyn Read,
    ) -> StoreResult<PathBuf>;

    /// Open a snapshot entry for reading. Fails with NotFound when absent.
    fn get_file(&self, model: &ModelId, sha: &str, filename: &str) -> StoreResult<std::fs::File>;

    /// Existence check for a snapshot entry.
    fn file_exists(
        &self,
        model: &ModelId,
        sha: &str,
        filename: &str,
    ) -> StoreResult<Option<EntryStat>>;

    /// Content id the entry's indirection points at; `None` when unresolved.
    fn file_etag(&self, model: &ModelId, sha: &str, filename: &str) -> Option<String>;

    /// Resolve a revision token to its content-set id, returning the token
    /// unchanged when no ref exists (an already-concrete sha still works).
    fn repo_sha(&self, model: &ModelId, revision: &str) -> String;

    /// Model index per the persisted document or a snapshot walk.
    fn repo_info(&self, model: &ModelId, revision: &str) -> StoreResult<ModelIndexInfo>;

    /// Names of plain files directly under the repo dir.
    fn list_files(&self, model: &ModelId) -> StoreResult<Vec<String>>;

    /// Total on-disk bytes of `list_files` results.
    ///
    /// Sums raw entry sizes, unlike `repo_info`'s blob-resolved accounting.
    /// The two intentionally disagree for snapshot content; see DESIGN.md.
    fn storage_info(&self, model: &ModelId) -> StoreResult<u64>;
}

/// Cache-aware file storage backing the [`Distribution`] facade.
#[derive(Clone, Debug)]
pub struct LocalStore {
    layout: RepoLayout,
    blobs: BlobStore,
    refs: RefStore,
    snapshots: SnapshotIndex,
    index: ModelIndex,
}

impl LocalStore {
    /// Open (and create if needed) the cache rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let layout = RepoLayout::open(root)?;
        Ok(LocalStore {
            blobs: BlobStore::new(layout.clone()),
            refs: RefStore::new(layout.clone()),
            snapshots: SnapshotIndex::new(layout.clone()),
            index: ModelIndex::new(layout.clone()),
            layout,
        })
    }

    pub fn layout(&self) -> &RepoLayout {
        &self.layout
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn snapshots(&self) -> &SnapshotIndex {
        &self.snapshots
    }
}

impl Distribution for LocalStore {
    fn store_file(
        &self,
        model: &ModelId,
        filename: &str,
        content: &mut dyn Read,
    ) -> StoreResult<PathBuf> {
        let entry = EntryPath::new(filename)?;
        let path = self.layout.repo_dir(model).join(entry.as_rel_path());
        let parent = path
            .parent()
            .ok_or_else(|| StoreError::InvalidPath(filename.to_string()))?;
        std::fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        std::io::copy(content, &mut tmp)?;
        tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
        Ok(path)
    }

    fn get_file(&self, model: &ModelId, sha: &str, filename: &str) -> StoreResult<std::fs::File> {
        let entry = EntryPath::new(filename)?;
        let path = self.layout.snapshot_path(model, sha, &entry);
        std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::FileNotFound {
                    model: model.to_string(),
                    filename: filename.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    fn file_exists(
        &self,
        model: &ModelId,
        sha: &str,
        filename: &str,
    ) -> StoreResult<Option<EntryStat>> {
        let entry = EntryPath::new(filename)?;
        Ok(self
            .snapshots
            .locate(model, sha, &entry)?
            .map(|meta| EntryStat {
                file_name: entry.file_name().to_string(),
                size: meta.len(),
            }))
    }

    fn file_etag(&self, model: &ModelId, sha: &str, filename: &str) -> Option<String> {
        let entry = EntryPath::new(filename).ok()?;
        self.snapshots.resolve_etag(model, sha, &entry)
    }

    fn repo_sha(&self, model: &ModelId, revision: &str) -> String {
        match self.refs.resolve(model, revision) {
            Ok(sha) => sha,
            Err(_) => revision.to_string(),
        }
    }

    fn repo_info(&self, model: &ModelId, revision: &str) -> StoreResult<ModelIndexInfo> {
        self.index.repo_info(model, revision)
    }

    fn list_files(&self, model: &ModelId) -> StoreResult<Vec<String>> {
        let repo_dir = self.layout.repo_dir(model);
        let entries = match std::fs::read_dir(&repo_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ModelNotFound(model.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                files.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        files.sort();
        Ok(files)
    }

    fn storage_info(&self, model: &ModelId) -> StoreResult<u64> {
        let repo_dir = self.layout.repo_dir(model);
        let mut total: u64 = 0;
        for name in self.list_files(model)? {
            if let Ok(meta) = std::fs::symlink_metadata(repo_dir.join(&name)) {
                total += meta.len();
            }
        }
        Ok(total)
    }
}

/// Placeholder for the version-control-backed storage backend.
///
/// Every operation reports `Unimplemented`; the backend exists so the
/// storage selector has a second variant to dispatch to.
#[derive(Clone, Copy, Debug, Default)]
pub struct VcsStore;

impl Distribution for VcsStore {
    fn store_file(
        &self,
        _model: &ModelId,
        _filename: &str,
        _content: &mut dyn Read,
    ) -> StoreResult<PathBuf> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }

    fn get_file(&self, _model: &ModelId, _sha: &str, _filename: &str) -> StoreResult<std::fs::File> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }

    fn file_exists(
        &self,
        _model: &ModelId,
        _sha: &str,
        _filename: &str,
    ) -> StoreResult<Option<EntryStat>> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }

    fn file_etag(&self, _model: &ModelId, _sha: &str, _filename: &str) -> Option<String> {
        None
    }

    fn repo_sha(&self, _model: &ModelId, revision: &str) -> String {
        revision.to_string()
    }

    fn repo_info(&self, _model: &ModelId, _revision: &str) -> StoreResult<ModelIndexInfo> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }

    fn list_files(&self, _model: &ModelId) -> StoreResult<Vec<String>> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }

    fn storage_info(&self, _model: &ModelId) -> StoreResult<u64> {
        Err(StoreError::Unimplemented("vcs-backed storage"))
    }
}

/// Storage backend selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    File,
    Vcs,
}

/// Build the distribution backend for `kind` rooted at `root`.
pub fn open_distribution(
    kind: StorageKind,
    root: impl Into<PathBuf>,
) -> StoreResult<Arc<dyn Distribution>> {
    match kind {
        StorageKind::File => Ok(Arc::new(LocalStore::open(root)?)),
        StorageKind::Vcs => Ok(Arc::new(VcsStore)),
    }
}
