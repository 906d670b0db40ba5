//! Gateway binary: parses flags, wires the state, serves until interrupted.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use siphon_server::{app, AppState, RefreshPolicy, ServerConfig};
use siphon_store::StorageKind;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

/// How long shutdown waits for in-flight background captures before
/// abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageArg {
    /// Cache-aware file storage.
    File,
    /// Version-control-backed storage (not implemented).
    Vcs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RefreshArg {
    /// Always re-fetch the model index from upstream.
    Always,
    /// Serve a cached index without going upstream.
    IfMissing,
}

/// Pull-through caching gateway for model hubs.
///
/// Clients address it exactly as they would the upstream hub; files are
/// served from the local content-addressed cache whenever possible.
#[derive(Parser, Debug)]
#[command(name = "siphon", version, about)]
struct Cli {
    /// Server host.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Server port.
    #[arg(short, long, default_value_t = 8081)]
    port: u16,

    /// Cache base directory. Defaults to `~/.cache/siphon`.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Upstream hub base URL.
    #[arg(long, default_value = "https://huggingface.co")]
    upstream: Url,

    /// Disable proxying cache misses to the upstream (serve cache-only).
    #[arg(long)]
    no_fallback_proxy: bool,

    /// Storage backend.
    #[arg(long, value_enum, default_value_t = StorageArg::File)]
    storage: StorageArg,

    /// Model index refresh policy.
    #[arg(long, value_enum, default_value_t = RefreshArg::Always)]
    refresh: RefreshArg,

    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let base_dir = cli.base_dir.unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cache")
            .join("siphon")
    });

    let mut config = ServerConfig::new(base_dir, cli.upstream);
    config.host = cli.host;
    config.port = cli.port;
    config.fallback_proxy = !cli.no_fallback_proxy;
    config.storage = match cli.storage {
        StorageArg::File => StorageKind::File,
        StorageArg::Vcs => StorageKind::Vcs,
    };
    config.refresh_policy = match cli.refresh {
        RefreshArg::Always => RefreshPolicy::Always,
        RefreshArg::IfMissing => RefreshPolicy::IfMissing,
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        base_dir = %config.base_dir.display(),
        upstream = %config.upstream_url,
        "starting gateway"
    );

    let bind_addr = config.bind_addr();
    let state = AppState::new(config)?;
    let cancel = state.cancel.clone();
    let fetcher = state.fetcher.clone();

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let in-flight background captures finish, then abandon stragglers.
    info!(in_flight = fetcher.in_flight(), "shutting down");
    if tokio::time::timeout(SHUTDOWN_GRACE, fetcher.shutdown())
        .await
        .is_err()
    {
        warn!("background captures still running, abandoning");
        cancel.cancel();
        fetcher.shutdown().await;
    }

    info!("server exiting");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
