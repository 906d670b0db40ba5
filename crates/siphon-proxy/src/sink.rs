use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use siphon_store::{BlobWriter, LocalStore, StoreError};
use tempfile::NamedTempFile;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::{CaptureError, CaptureResult, FileSpec, IndexSpec};

/// Per-key async locks serializing cache writes.
///
/// Two concurrent requests for the same (model, etag) take turns instead of
/// racing their renames, giving at-most-once-effective-write semantics.
#[derive(Debug, Default)]
struct WriteLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteLocks {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().expect("write lock map poisoned");
            Arc::clone(map.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// Something a response body can be teed into.
pub trait CaptureWrite: Send {
    /// Append a chunk. Errors abandon the capture, never the client stream.
    fn write(&mut self, chunk: &[u8]) -> CaptureResult<()>;

    /// Commit the capture once the body ended cleanly.
    fn finish(self) -> CaptureResult<()>
    where
        Self: Sized;
}

/// Sole writer of blobs, refs, and model index documents.
///
/// All captures go through here so the per-key locks actually serialize
/// every path that touches the same on-disk entry.
pub struct CaptureSink {
    store: LocalStore,
    locks: WriteLocks,
}

impl CaptureSink {
    pub fn new(store: LocalStore) -> Self {
        CaptureSink {
            store,
            locks: WriteLocks::default(),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Start capturing file content for `spec`.
    ///
    /// Holds the (model, etag) write lock until the capture commits or is
    /// dropped.
    pub async fn begin_file(&self, spec: &FileSpec) -> CaptureResult<FileCapture> {
        let key = format!("{}/blobs/{}", spec.model.repo_dirname(), spec.etag);
        let guard = self.locks.acquire(key).await;
        let writer = self.store.blobs().writer(&spec.model, &spec.etag)?;
        debug!(model = %spec.model, etag = %spec.etag, "file capture started");
        Ok(FileCapture {
            writer,
            store: self.store.clone(),
            spec: spec.clone(),
            _guard: guard,
        })
    }

    /// Start capturing an index response body for `spec`.
    pub async fn begin_index(&self, spec: &IndexSpec) -> CaptureResult<IndexCapture> {
        let key = format!("{}/.modeindex", spec.model.repo_dirname());
        let guard = self.locks.acquire(key).await;

        let repo_dir = self.store.layout().repo_dir(&spec.model);
        std::fs::create_dir_all(&repo_dir).map_err(StoreError::Io)?;
        let tmp = NamedTempFile::new_in(&repo_dir).map_err(StoreError::Io)?;
        debug!(model = %spec.model, revision = %spec.revision, "index capture started");
        Ok(IndexCapture {
            tmp: Some(tmp),
            target: self.store.layout().index_path(&spec.model),
            store: self.store.clone(),
            spec: spec.clone(),
            _guard: guard,
        })
    }
}

/// In-flight file capture: blob bytes plus the snapshot entry linked on
/// commit. Dropped without `finish`, the temp blob disappears and no
/// snapshot entry is created.
pub struct FileCapture {
    writer: BlobWriter,
    store: LocalStore,
    spec: FileSpec,
    _guard: OwnedMutexGuard<()>,
}

impl CaptureWrite for FileCapture {
    fn write(&mut self, chunk: &[u8]) -> CaptureResult<()> {
        self.writer.write(chunk)?;
        Ok(())
    }

    /// Rename the blob into place, then link the snapshot entry at it.
    /// The entry is created only after the blob is durable, so a reader
    /// never follows it into a partial file.
    fn finish(self) -> CaptureResult<()> {
        self.writer.commit()?;
        self.store.snapshots().materialize(
            &self.spec.model,
            &self.spec.sha,
            &self.spec.entry,
            &self.spec.etag,
        )?;
        debug!(
            model = %self.spec.model,
            sha = %self.spec.sha,
            file = %self.spec.entry.as_str(),
            "file capture committed"
        );
        Ok(())
    }
}

/// In-flight index capture: the response body becomes `.modeindex` and the
/// revision ref is recorded from the upstream's commit header.
pub struct IndexCapture {
    tmp: Option<NamedTempFile>,
    target: PathBuf,
    store: LocalStore,
    spec: IndexSpec,
    _guard: OwnedMutexGuard<()>,
}

impl CaptureWrite for IndexCapture {
    fn write(&mut self, chunk: &[u8]) -> CaptureResult<()> {
        let tmp = self
            .tmp
            .as_mut()
            .ok_or_else(|| CaptureError::Io(std::io::Error::other("index capture finished")))?;
        tmp.write_all(chunk)?;
        Ok(())
    }

    fn finish(mut self) -> CaptureResult<()> {
        let tmp = self
            .tmp
            .take()
            .ok_or_else(|| CaptureError::Io(std::io::Error::other("index capture finished")))?;
        tmp.persist(&self.target)
            .map_err(|e| CaptureError::Io(e.error))?;

        match &self.spec.sha {
            Some(sha) => {
                self.store
                    .refs()
                    .record(&self.spec.model, &self.spec.revision, sha)?;
            }
            None => {
                tracing::warn!(
                    model = %self.spec.model,
                    revision = %self.spec.revision,
                    "index response carried no commit header, ref not recorded"
                );
            }
        }
        debug!(model = %self.spec.model, revision = %self.spec.revision, "index capture committed");
        Ok(())
    }
}
