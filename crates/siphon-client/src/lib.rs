#![forbid(unsafe_code)]

//! `siphon-client`
//!
//! Thin client for the siphon gateway API: upload files, download files
//! through the resolve route, and fetch model index information.

use std::path::Path;

use bytes::Bytes;
use siphon_store::ModelIndexInfo;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

/// Client for a siphon gateway (or any hub speaking the same API).
#[derive(Clone, Debug)]
pub struct Client {
    base_url: Url,
    inner: reqwest::Client,
}

impl Client {
    pub fn new(base_url: Url) -> Self {
        Client {
            base_url,
            inner: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    async fn check(resp: reqwest::Response) -> ClientResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Upload a file; returns the stored path reported by the server.
    pub async fn upload(
        &self,
        model_id: &str,
        filename: &str,
        content: Bytes,
    ) -> ClientResult<String> {
        let url = self.url(&format!("/api/models/{model_id}?path={filename}"))?;
        let resp = Self::check(self.inner.put(url).body(content).send().await?).await?;

        #[derive(serde::Deserialize)]
        struct UploadResponse {
            path: String,
        }
        let parsed: UploadResponse = resp.json().await?;
        Ok(parsed.path)
    }

    /// Upload a local file.
    pub async fn upload_from_path(
        &self,
        model_id: &str,
        filename: &str,
        local: &Path,
    ) -> ClientResult<String> {
        let content = tokio::fs::read(local).await?;
        self.upload(model_id, filename, content.into()).await
    }

    /// Download one file of a revision's content set.
    pub async fn download(
        &self,
        model_id: &str,
        revision: &str,
        filename: &str,
    ) -> ClientResult<Bytes> {
        let url = self.url(&format!("/{model_id}/resolve/{revision}/{filename}"))?;
        let resp = Self::check(self.inner.get(url).send().await?).await?;
        Ok(resp.bytes().await?)
    }

    /// Download a file and write it to `local`.
    pub async fn download_to_path(
        &self,
        model_id: &str,
        revision: &str,
        filename: &str,
        local: &Path,
    ) -> ClientResult<()> {
        let content = self.download(model_id, revision, filename).await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, &content).await?;
        Ok(())
    }

    /// Fetch model index information from the gateway's local facade.
    pub async fn model_info(
        &self,
        model_id: &str,
        version: &str,
    ) -> ClientResult<ModelIndexInfo> {
        let url = self.url(&format!("/api/models/{model_id}/info/{version}"))?;
        let resp = Self::check(self.inner.get(url).send().await?).await?;
        Ok(resp.json().await?)
    }

    /// Liveness probe.
    pub async fn health(&self) -> ClientResult<()> {
        let url = self.url("/health")?;
        Self::check(self.inner.get(url).send().await?).await?;
        Ok(())
    }
}
