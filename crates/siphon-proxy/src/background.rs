use std::sync::Arc;

use futures::StreamExt;
use siphon_net::{byte_stream, HubClient};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use url::Url;

use crate::{CaptureResult, CaptureSink, CaptureWrite, FileSpec};

/// Supervised out-of-band fetches for redirect responses.
///
/// Each capture runs on a tracked task tied to the server's shutdown token:
/// shutdown either awaits in-flight captures or abandons them with a logged
/// reason, and an abandoned capture leaves nothing at the final blob path.
pub struct BackgroundFetcher {
    client: HubClient,
    sink: Arc<CaptureSink>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl BackgroundFetcher {
    pub fn new(client: HubClient, sink: Arc<CaptureSink>, cancel: CancellationToken) -> Self {
        BackgroundFetcher {
            client,
            sink,
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    /// Fire off a capture of `location` as the snapshot entry in `spec`.
    ///
    /// Returns immediately; the originating request's response is already on
    /// its way to the client. Failure is logged, never surfaced.
    pub fn spawn(&self, spec: FileSpec, location: Url) {
        let client = self.client.clone();
        let sink = Arc::clone(&self.sink);
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    warn!(
                        model = %spec.model,
                        file = %spec.entry.as_str(),
                        url = %location,
                        "shutdown before background capture finished, abandoning"
                    );
                }
                result = fetch_into_cache(&client, &sink, &spec, location.clone()) => {
                    match result {
                        Ok(bytes) => info!(
                            model = %spec.model,
                            file = %spec.entry.as_str(),
                            bytes,
                            "background capture complete"
                        ),
                        Err(e) => warn!(
                            model = %spec.model,
                            file = %spec.entry.as_str(),
                            url = %location,
                            error = %e,
                            "background capture failed"
                        ),
                    }
                }
            }
        });
    }

    /// Number of captures still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting new captures and wait for in-flight ones.
    ///
    /// Callers cancel the shutdown token first when they want abandonment
    /// rather than completion.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn fetch_into_cache(
    client: &HubClient,
    sink: &CaptureSink,
    spec: &FileSpec,
    location: Url,
) -> CaptureResult<u64> {
    let resp = client.download(location).await?;
    let mut capture = sink.begin_file(spec).await?;

    let mut stream = byte_stream(resp);
    let mut total: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        capture.write(&chunk)?;
        total += chunk.len() as u64;
    }
    capture.finish()?;
    Ok(total)
}
