use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use siphon_core::ModelId;
use tempfile::NamedTempFile;

use crate::layout::validate_token;
use crate::{RepoLayout, StoreError, StoreResult};

/// Write buffer between the response stream and the filesystem.
const WRITE_BUF_SIZE: usize = 64 * 1024;

/// Content-addressed blob storage under `blobs/<etag>`.
///
/// The etag is trusted as supplied by the upstream; identical etag implies
/// identical content and is never re-verified.
#[derive(Clone, Debug)]
pub struct BlobStore {
    layout: RepoLayout,
}

impl BlobStore {
    pub fn new(layout: RepoLayout) -> Self {
        BlobStore { layout }
    }

    /// Start writing a blob. Bytes go to a uniquely-named temp file in the
    /// blobs directory; nothing is visible at `blobs/<etag>` until
    /// [`BlobWriter::commit`] renames it into place.
    pub fn writer(&self, model: &ModelId, etag: &str) -> StoreResult<BlobWriter> {
        validate_token("etag", etag)?;
        let blobs_dir = self.layout.blobs_dir(model);
        std::fs::create_dir_all(&blobs_dir)?;

        let tmp = NamedTempFile::new_in(&blobs_dir)?;
        Ok(BlobWriter {
            inner: Some(BufWriter::with_capacity(WRITE_BUF_SIZE, tmp)),
            target: blobs_dir.join(etag),
        })
    }

    /// Open a blob for reading. Fails with [`StoreError::BlobNotFound`] if
    /// the blob has not been captured.
    pub fn open(&self, model: &ModelId, etag: &str) -> StoreResult<std::fs::File> {
        validate_token("etag", etag)?;
        let path = self.layout.blob_path(model, etag);
        std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::BlobNotFound {
                    model: model.to_string(),
                    etag: etag.to_string(),
                }
            } else {
                StoreError::Io(e)
            }
        })
    }

    /// Size in bytes of a stored blob.
    pub fn size(&self, model: &ModelId, etag: &str) -> StoreResult<u64> {
        validate_token("etag", etag)?;
        let path = self.layout.blob_path(model, etag);
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::BlobNotFound {
                model: model.to_string(),
                etag: etag.to_string(),
            }),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub fn path(&self, model: &ModelId, etag: &str) -> PathBuf {
        self.layout.blob_path(model, etag)
    }
}

/// In-progress blob write.
///
/// Dropping the writer without committing removes the temp file, so a
/// half-written capture never becomes visible at the final path.
pub struct BlobWriter {
    inner: Option<BufWriter<NamedTempFile>>,
    target: PathBuf,
}

impl BlobWriter {
    pub fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("blob writer already committed")))?;
        writer.write_all(chunk)?;
        Ok(())
    }

    /// Flush and atomically rename the temp file to `blobs/<etag>`.
    ///
    /// An existing blob with the same etag is replaced; readers see either
    /// the old file or the new one, never a partial write.
    pub fn commit(mut self) -> StoreResult<PathBuf> {
        let writer = self
            .inner
            .take()
            .ok_or_else(|| StoreError::Io(std::io::Error::other("blob writer already committed")))?;
        let tmp = writer
            .into_inner()
            .map_err(|e| StoreError::Io(e.into_error()))?;
        tmp.persist(&self.target)
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(self.target.clone())
    }

    pub fn target(&self) -> &Path {
        &self.target
    }
}
