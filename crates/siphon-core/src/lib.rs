#![forbid(unsafe_code)]

//! `siphon-core`
//!
//! Model identity for the siphon gateway: the [`ModelId`] newtype and the
//! hub directory codec shared by the cache and any external tool that
//! understands the same on-disk convention.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid model id: {0}")]
    InvalidModelId(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Directory name prefix for model repositories under the cache root.
const REPO_DIR_PREFIX: &str = "models--";

/// A hub model identifier, conventionally `owner/name`.
///
/// Segments must be non-empty and must not contain path separators or
/// parent-directory references, so an id always maps to exactly one flat
/// directory name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::InvalidModelId("empty id".to_string()));
        }
        for segment in id.split('/') {
            if segment.is_empty() {
                return Err(CoreError::InvalidModelId(format!(
                    "empty segment in {id:?}"
                )));
            }
            if segment == "." || segment == ".." {
                return Err(CoreError::InvalidModelId(format!(
                    "relative segment in {id:?}"
                )));
            }
            if segment.contains('\\') {
                return Err(CoreError::InvalidModelId(format!(
                    "path separator in segment of {id:?}"
                )));
            }
        }
        Ok(ModelId(id))
    }

    /// Build an id from the two route segments of an `owner/name` URL.
    pub fn from_parts(owner: &str, name: &str) -> CoreResult<Self> {
        Self::new(format!("{owner}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part of the id before the first separator.
    pub fn author(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Encode the id as the flat hub directory name.
    ///
    /// `Qwen/Qwen2-0.5B-Instruct` becomes `models--Qwen--Qwen2-0.5B-Instruct`.
    /// Injective for the supported character set: `/` never survives the
    /// mapping, and segments cannot be empty, so distinct ids cannot collide.
    pub fn repo_dirname(&self) -> String {
        format!("{REPO_DIR_PREFIX}{}", self.0.replace('/', "--"))
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
