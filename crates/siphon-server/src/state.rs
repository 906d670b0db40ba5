use std::sync::Arc;

use siphon_net::{HubClient, NetError};
use siphon_proxy::{BackgroundFetcher, CaptureSink};
use siphon_store::{Distribution, LocalStore, StorageKind, StoreError, VcsStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum InitError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("network error: {0}")]
    Net(#[from] NetError),
}

/// Shared per-request state.
///
/// The capture sink always writes the file layout — the proxy is the sole
/// writer of blobs, refs, and index documents regardless of which backend
/// serves reads.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub distribution: Arc<dyn Distribution>,
    pub client: HubClient,
    pub sink: Arc<CaptureSink>,
    pub fetcher: Arc<BackgroundFetcher>,
    pub cancel: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Result<Self, InitError> {
        let store = LocalStore::open(&config.base_dir)?;
        let distribution: Arc<dyn Distribution> = match config.storage {
            StorageKind::File => Arc::new(store.clone()),
            StorageKind::Vcs => Arc::new(VcsStore),
        };

        let client = HubClient::new(config.upstream_url.clone(), &config.net)?;
        let sink = Arc::new(CaptureSink::new(store));
        let cancel = CancellationToken::new();
        let fetcher = Arc::new(BackgroundFetcher::new(
            client.clone(),
            Arc::clone(&sink),
            cancel.clone(),
        ));

        Ok(AppState {
            config: Arc::new(config),
            distribution,
            client,
            sink,
            fetcher,
            cancel,
        })
    }
}
