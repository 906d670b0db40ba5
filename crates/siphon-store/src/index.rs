use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use siphon_core::ModelId;
use tracing::debug;

use crate::{BlobStore, RefStore, RepoLayout, StoreError, StoreResult};

/// One file belonging to a revision's content set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingFile {
    pub rfilename: String,
}

fn default_timestamp() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// The model index document persisted as `.modeindex`.
///
/// Captured verbatim from the upstream's index response, or synthesized from
/// a snapshot walk when no capture has happened yet. Unknown upstream fields
/// are ignored; missing ones fall back to zero values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIndexInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default = "default_timestamp")]
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default = "default_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub used_storage: u64,
    #[serde(default)]
    pub siblings: Vec<SiblingFile>,
}

/// Loads the persisted model index, or reconstructs it from on-disk state.
///
/// Reader only: the synthesized document is never written back. Only the
/// proxy capture path persists `.modeindex`.
#[derive(Clone, Debug)]
pub struct ModelIndex {
    layout: RepoLayout,
    refs: RefStore,
    blobs: BlobStore,
}

impl ModelIndex {
    pub fn new(layout: RepoLayout) -> Self {
        ModelIndex {
            refs: RefStore::new(layout.clone()),
            blobs: BlobStore::new(layout.clone()),
            layout,
        }
    }

    /// Return the model index for `model` at `revision`.
    ///
    /// A persisted `.modeindex` wins; a parse failure there is a hard error,
    /// not silently repaired. Without one, the revision is resolved and the
    /// snapshot directory walked.
    pub fn repo_info(&self, model: &ModelId, revision: &str) -> StoreResult<ModelIndexInfo> {
        let index_path = self.layout.index_path(model);
        match std::fs::read(&index_path) {
            Ok(data) => {
                let info: ModelIndexInfo = serde_json::from_slice(&data)?;
                Ok(info)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(model = %model, revision, "no persisted model index, synthesizing");
                self.synthesize(model, revision)
            }
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Build the document from the snapshot directory for the resolved
    /// revision. Symlinked entries contribute their blob's size so the total
    /// reflects actual content, not link entries.
    fn synthesize(&self, model: &ModelId, revision: &str) -> StoreResult<ModelIndexInfo> {
        let sha = self.refs.resolve(model, revision)?;
        let snapshot_dir = self.layout.snapshot_dir(model, &sha);

        let mut siblings = Vec::new();
        let mut total_size: u64 = 0;
        self.walk(model, &snapshot_dir, "", &mut siblings, &mut total_size)?;

        let now = Utc::now();
        Ok(ModelIndexInfo {
            id: model.to_string(),
            model_id: model.to_string(),
            author: model.author().to_string(),
            sha,
            last_modified: now,
            disabled: false,
            created_at: now,
            used_storage: total_size,
            siblings,
        })
    }

    fn walk(
        &self,
        model: &ModelId,
        dir: &Path,
        prefix: &str,
        siblings: &mut Vec<SiblingFile>,
        total_size: &mut u64,
    ) -> StoreResult<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ModelNotFound(model.to_string()));
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let rel = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };
            let file_type = entry.file_type()?;

            if file_type.is_dir() {
                self.walk(model, &entry.path(), &rel, siblings, total_size)?;
                continue;
            }

            siblings.push(SiblingFile { rfilename: rel });

            if file_type.is_symlink() {
                let target = std::fs::read_link(entry.path())?;
                let etag = target
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        StoreError::InvalidPath(format!(
                            "unreadable link target at {}",
                            entry.path().display()
                        ))
                    })?
                    .to_string();
                *total_size += self.blobs.size(model, &etag)?;
            } else {
                *total_size += entry.metadata()?.len();
            }
        }
        Ok(())
    }
}
