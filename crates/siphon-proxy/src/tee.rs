use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::warn;

use crate::CaptureWrite;

/// Duplicate an upstream body into a capture while it streams to the client.
///
/// Single producer, one tee point, two consumers: each chunk is appended to
/// the capture before being yielded onward, so both sides observe upstream's
/// emission order. The whole body is never materialized in memory.
///
/// Capture semantics:
/// - a cache write failure abandons the capture and logs; the client stream
///   continues untouched
/// - an upstream error abandons the capture and is forwarded to the client
/// - clean end of stream commits the capture; a commit failure is logged
/// - dropping the returned stream early (client disconnect) drops the
///   capture uncommitted, leaving nothing at the final path
pub fn tee<S, C, E>(upstream: S, capture: C) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    C: CaptureWrite + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut capture = Some(capture);
        futures::pin_mut!(upstream);

        while let Some(next) = upstream.next().await {
            match next {
                Ok(chunk) => {
                    if let Some(c) = capture.as_mut() {
                        if let Err(e) = c.write(&chunk) {
                            warn!(error = %e, "cache write failed, abandoning capture");
                            capture = None;
                        }
                    }
                    yield Ok(chunk);
                }
                Err(e) => {
                    if capture.take().is_some() {
                        warn!(error = %e, "upstream stream failed, abandoning capture");
                    }
                    yield Err(e);
                    return;
                }
            }
        }

        if let Some(c) = capture.take() {
            if let Err(e) = c.finish() {
                warn!(error = %e, "capture commit failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use futures::stream;

    use super::*;
    use crate::CaptureResult;

    #[derive(Debug, thiserror::Error)]
    #[error("source error")]
    struct SourceError;

    #[derive(Clone, Default)]
    struct RecordingCapture {
        written: Arc<Mutex<Vec<u8>>>,
        finished: Arc<Mutex<bool>>,
        fail_write: bool,
    }

    impl CaptureWrite for RecordingCapture {
        fn write(&mut self, chunk: &[u8]) -> CaptureResult<()> {
            if self.fail_write {
                return Err(crate::CaptureError::Io(std::io::Error::other("disk full")));
            }
            self.written.lock().unwrap().extend_from_slice(chunk);
            Ok(())
        }

        fn finish(self) -> CaptureResult<()> {
            *self.finished.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_and_captures_identical_bytes() {
        let capture = RecordingCapture::default();
        let written = capture.written.clone();
        let finished = capture.finished.clone();

        let upstream = stream::iter(vec![
            Ok::<_, SourceError>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);

        let teed = tee(upstream, capture);
        let delivered: Vec<_> = teed.collect().await;

        let bytes: Vec<u8> = delivered
            .into_iter()
            .flat_map(|r| r.unwrap().to_vec())
            .collect();
        assert_eq!(bytes, b"hello world");
        assert_eq!(written.lock().unwrap().as_slice(), b"hello world");
        assert!(*finished.lock().unwrap());
    }

    #[tokio::test]
    async fn upstream_error_reaches_client_and_skips_commit() {
        let capture = RecordingCapture::default();
        let finished = capture.finished.clone();

        let upstream = stream::iter(vec![
            Ok::<_, SourceError>(Bytes::from_static(b"partial")),
            Err(SourceError),
        ]);

        let teed = tee(upstream, capture);
        let delivered: Vec<_> = teed.collect().await;

        assert_eq!(delivered.len(), 2);
        assert!(delivered[0].is_ok());
        assert!(delivered[1].is_err());
        assert!(!*finished.lock().unwrap(), "errored stream must not commit");
    }

    #[tokio::test]
    async fn cache_write_failure_does_not_disturb_client() {
        let capture = RecordingCapture {
            fail_write: true,
            ..Default::default()
        };
        let finished = capture.finished.clone();

        let upstream = stream::iter(vec![
            Ok::<_, SourceError>(Bytes::from_static(b"a")),
            Ok(Bytes::from_static(b"b")),
        ]);

        let teed = tee(upstream, capture);
        let delivered: Vec<u8> = teed
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flat_map(|r| r.unwrap().to_vec())
            .collect();

        assert_eq!(delivered, b"ab", "client still gets the full body");
        assert!(!*finished.lock().unwrap(), "abandoned capture must not commit");
    }
}
