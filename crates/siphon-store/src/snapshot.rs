use std::path::PathBuf;

use siphon_core::ModelId;

use crate::layout::validate_token;
use crate::{EntryPath, RepoLayout, StoreError, StoreResult};

/// Per-revision directory of named entries, each a symlink resolving into
/// the blob store.
#[derive(Clone, Debug)]
pub struct SnapshotIndex {
    layout: RepoLayout,
}

impl SnapshotIndex {
    pub fn new(layout: RepoLayout) -> Self {
        SnapshotIndex { layout }
    }

    /// Existence check for `snapshots/<sha>/<entry>`.
    ///
    /// Follows the symlink, so a dangling entry (blob missing) reports as
    /// absent and the caller falls back to refetching.
    pub fn locate(
        &self,
        model: &ModelId,
        sha: &str,
        entry: &EntryPath,
    ) -> StoreResult<Option<std::fs::Metadata>> {
        validate_token("sha", sha)?;
        let path = self.layout.snapshot_path(model, sha, entry);
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Create the snapshot entry pointing at `blobs/<etag>`, replacing any
    /// existing entry at that path.
    ///
    /// Callers commit the blob first; the entry is linked afterwards so a
    /// reader never resolves the indirection into a missing or partial blob.
    pub fn materialize(
        &self,
        model: &ModelId,
        sha: &str,
        entry: &EntryPath,
        etag: &str,
    ) -> StoreResult<()> {
        validate_token("sha", sha)?;
        validate_token("etag", etag)?;

        let path = self.layout.snapshot_path(model, sha, entry);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // Relative target keeps the repo dir relocatable: up past the entry's
        // own directories, the sha dir, and `snapshots/`.
        let mut target = PathBuf::new();
        for _ in 0..(entry.depth() + 2) {
            target.push("..");
        }
        target.push("blobs");
        target.push(etag);

        // Link at a temp name, then rename over the final path so an existing
        // entry is replaced atomically.
        let tmp = path.with_file_name(format!(".{}.tmp-link", entry.file_name()));
        let _ = std::fs::remove_file(&tmp);
        symlink(&target, &tmp)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Read the etag a snapshot entry points at: the trailing segment of the
    /// symlink target. `None` when the entry is missing or not a symlink.
    pub fn resolve_etag(&self, model: &ModelId, sha: &str, entry: &EntryPath) -> Option<String> {
        let path = self.layout.snapshot_path(model, sha, entry);
        let target = std::fs::read_link(&path).ok()?;
        target
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
    }
}

#[cfg(unix)]
fn symlink(target: &std::path::Path, link: &std::path::Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &std::path::Path, link: &std::path::Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
