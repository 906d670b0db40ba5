use std::io::Write;

use siphon_core::ModelId;
use tempfile::NamedTempFile;

use crate::layout::validate_token;
use crate::{RepoLayout, StoreError, StoreResult};

/// Revision resolver: maps mutable revision tokens (branch names, tags,
/// `main`) to immutable content-set ids via small files under `refs/`.
///
/// Each write fully replaces the previous mapping; no history is kept.
#[derive(Clone, Debug)]
pub struct RefStore {
    layout: RepoLayout,
}

impl RefStore {
    pub fn new(layout: RepoLayout) -> Self {
        RefStore { layout }
    }

    /// Read the content-set id recorded for `revision`.
    ///
    /// Fails with [`StoreError::RefNotFound`] when the ref file is absent or
    /// empty. Callers that accept a raw sha in place of a revision token
    /// handle the fallback themselves (see `Distribution::repo_sha`).
    pub fn resolve(&self, model: &ModelId, revision: &str) -> StoreResult<String> {
        validate_token("revision", revision)?;
        let path = self.layout.ref_path(model, revision);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::RefNotFound {
                    model: model.to_string(),
                    revision: revision.to_string(),
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };
        let sha = raw.trim_end().to_string();
        if sha.is_empty() {
            return Err(StoreError::RefNotFound {
                model: model.to_string(),
                revision: revision.to_string(),
            });
        }
        Ok(sha)
    }

    /// Record `revision → sha`, replacing any previous mapping.
    ///
    /// Written to a temp file and renamed into place so a concurrent
    /// `resolve` sees either the old mapping or the new one.
    pub fn record(&self, model: &ModelId, revision: &str, sha: &str) -> StoreResult<()> {
        validate_token("revision", revision)?;
        validate_token("sha", sha)?;
        let refs_dir = self.layout.refs_dir(model);
        std::fs::create_dir_all(&refs_dir)?;

        let mut tmp = NamedTempFile::new_in(&refs_dir)?;
        tmp.write_all(sha.as_bytes())?;
        tmp.persist(self.layout.ref_path(model, revision))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(dir: &tempfile::TempDir) -> RefStore {
        RefStore::new(RepoLayout::open(dir.path()).unwrap())
    }

    fn model() -> ModelId {
        ModelId::new("acme/foo").unwrap()
    }

    #[test]
    fn record_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let refs = refs(&dir);
        let m = model();

        refs.record(&m, "main", "abc123").unwrap();
        assert_eq!(refs.resolve(&m, "main").unwrap(), "abc123");
    }

    #[test]
    fn record_overwrites_previous_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let refs = refs(&dir);
        let m = model();

        refs.record(&m, "main", "abc123").unwrap();
        refs.record(&m, "main", "def456").unwrap();
        assert_eq!(refs.resolve(&m, "main").unwrap(), "def456");
    }

    #[test]
    fn resolve_missing_ref_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = refs(&dir).resolve(&model(), "main").unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
    }

    #[test]
    fn resolve_trims_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let refs = refs(&dir);
        let m = model();

        // External tools may write the ref with a trailing newline.
        let path = refs.layout.ref_path(&m, "main");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "abc123\n").unwrap();

        assert_eq!(refs.resolve(&m, "main").unwrap(), "abc123");
    }

    #[test]
    fn empty_ref_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let refs = refs(&dir);
        let m = model();

        let path = refs.layout.ref_path(&m, "main");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "").unwrap();

        assert!(refs.resolve(&m, "main").unwrap_err().is_not_found());
    }

    #[test]
    fn rejects_revision_with_separator() {
        let dir = tempfile::tempdir().unwrap();
        assert!(refs(&dir).record(&model(), "a/b", "abc").is_err());
    }
}
