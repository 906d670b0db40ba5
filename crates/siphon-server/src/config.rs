use std::path::PathBuf;

use siphon_net::NetOptions;
use siphon_store::StorageKind;
use url::Url;

/// Whether an index fetch always goes upstream or serves the cached copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Always re-fetch from upstream; the ref and index are overwritten on
    /// every successful response.
    Always,
    /// Serve a persisted `.modeindex` without touching the network; go
    /// upstream only when none exists yet.
    IfMissing,
}

/// Explicit gateway configuration, threaded through construction.
///
/// Nothing here is read from ambient process state at call time.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Cache root; the layout lives under `<base_dir>/hub`.
    pub base_dir: PathBuf,
    /// Upstream hub the gateway fronts.
    pub upstream_url: Url,
    /// Proxy cache misses to the upstream instead of returning 404.
    pub fallback_proxy: bool,
    pub refresh_policy: RefreshPolicy,
    pub storage: StorageKind,
    pub net: NetOptions,
}

impl ServerConfig {
    /// Config with defaults matching the CLI flags.
    pub fn new(base_dir: impl Into<PathBuf>, upstream_url: Url) -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8081,
            base_dir: base_dir.into(),
            upstream_url,
            fallback_proxy: true,
            refresh_policy: RefreshPolicy::Always,
            storage: StorageKind::File,
            net: NetOptions::default(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
