use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::{stream, StreamExt};
use rstest::rstest;
use siphon_core::ModelId;
use siphon_net::{HubClient, NetError, NetOptions};
use siphon_proxy::{tee, BackgroundFetcher, CaptureSink, FileSpec, IndexSpec};
use siphon_store::{Distribution, EntryPath, LocalStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sink(dir: &TempDir) -> Arc<CaptureSink> {
    Arc::new(CaptureSink::new(LocalStore::open(dir.path()).unwrap()))
}

fn model() -> ModelId {
    ModelId::new("acme/foo").unwrap()
}

fn file_spec(etag: &str) -> FileSpec {
    FileSpec {
        model: model(),
        sha: "abc123".to_string(),
        entry: EntryPath::new("config.json").unwrap(),
        etag: etag.to_string(),
    }
}

fn read_to_vec(mut f: std::fs::File) -> Vec<u8> {
    let mut buf = Vec::new();
    f.read_to_end(&mut buf).unwrap();
    buf
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn file_capture_persists_blob_and_snapshot_entry() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    let spec = file_spec("deadbeef");

    let upstream = stream::iter(vec![
        Ok::<_, NetError>(Bytes::from_static(b"{\"layers\":")),
        Ok(Bytes::from_static(b"12}")),
    ]);
    let capture = sink.begin_file(&spec).await.unwrap();

    let delivered: Vec<u8> = tee(upstream, capture)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flat_map(|r| r.unwrap().to_vec())
        .collect();
    assert_eq!(delivered, b"{\"layers\":12}");

    let store = sink.store();
    let blob = read_to_vec(store.blobs().open(&model(), "deadbeef").unwrap());
    assert_eq!(blob, b"{\"layers\":12}");

    // The snapshot entry resolves through the symlink to the same bytes.
    let via_snapshot = read_to_vec(store.get_file(&model(), "abc123", "config.json").unwrap());
    assert_eq!(via_snapshot, delivered);
    assert_eq!(
        store.file_etag(&model(), "abc123", "config.json"),
        Some("deadbeef".to_string())
    );
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn abandoned_file_capture_leaves_no_final_blob() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    let spec = file_spec("deadbeef");

    let upstream = stream::iter(vec![
        Ok::<_, NetError>(Bytes::from_static(b"partial")),
        Err(NetError::Timeout),
    ]);
    let capture = sink.begin_file(&spec).await.unwrap();

    let results: Vec<_> = tee(upstream, capture).collect().await;
    assert!(results.last().unwrap().is_err());

    assert!(sink.store().blobs().open(&model(), "deadbeef").is_err());
    assert!(sink
        .store()
        .file_exists(&model(), "abc123", "config.json")
        .unwrap()
        .is_none());
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn client_disconnect_drops_capture_uncommitted() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    let spec = file_spec("deadbeef");

    let upstream = stream::iter(vec![
        Ok::<_, NetError>(Bytes::from_static(b"first")),
        Ok(Bytes::from_static(b"second")),
    ]);
    let capture = sink.begin_file(&spec).await.unwrap();

    {
        let teed = tee(upstream, capture);
        futures::pin_mut!(teed);
        // Consume one chunk, then hang up.
        let first = teed.next().await.unwrap().unwrap();
        assert_eq!(first, Bytes::from_static(b"first"));
    }

    assert!(sink.store().blobs().open(&model(), "deadbeef").is_err());
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn index_capture_persists_document_and_ref() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    let spec = IndexSpec {
        model: model(),
        revision: "main".to_string(),
        sha: Some("abc123".to_string()),
    };

    let body = br#"{"id":"acme/foo","sha":"abc123","siblings":[{"rfilename":"config.json"}]}"#;
    let upstream = stream::iter(vec![Ok::<_, NetError>(Bytes::from_static(body))]);
    let capture = sink.begin_index(&spec).await.unwrap();

    let delivered: Vec<u8> = tee(upstream, capture)
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flat_map(|r| r.unwrap().to_vec())
        .collect();
    assert_eq!(delivered, body);

    let store = sink.store();
    let persisted = std::fs::read(store.layout().index_path(&model())).unwrap();
    assert_eq!(persisted, body, ".modeindex equals the captured body");

    assert_eq!(store.refs().resolve(&model(), "main").unwrap(), "abc123");

    // The persisted document now answers repo_info directly.
    let info = store.repo_info(&model(), "main").unwrap();
    assert_eq!(info.sha, "abc123");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
#[tokio::test]
async fn index_capture_without_commit_header_skips_ref() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);
    let spec = IndexSpec {
        model: model(),
        revision: "main".to_string(),
        sha: None,
    };

    let upstream = stream::iter(vec![Ok::<_, NetError>(Bytes::from_static(b"{}"))]);
    let capture = sink.begin_index(&spec).await.unwrap();
    let _: Vec<_> = tee(upstream, capture).collect().await;

    let store = sink.store();
    assert!(store.layout().index_path(&model()).exists());
    assert!(store.refs().resolve(&model(), "main").is_err());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn background_fetch_materializes_snapshot_entry() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);

    let router = Router::new().route("/cdn/blob1", get(|| async { "model weights" }));
    let server = siphon_test_utils::TestHttpServer::new(router).await;

    let cancel = CancellationToken::new();
    let client = HubClient::new(server.base_url().clone(), &NetOptions::default()).unwrap();
    let fetcher = BackgroundFetcher::new(client, Arc::clone(&sink), cancel);

    fetcher.spawn(file_spec("feedface"), server.url("/cdn/blob1"));
    fetcher.shutdown().await;

    let store = sink.store();
    let blob = read_to_vec(store.blobs().open(&model(), "feedface").unwrap());
    assert_eq!(blob, b"model weights");
    assert!(store
        .file_exists(&model(), "abc123", "config.json")
        .unwrap()
        .is_some());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn cancelled_background_fetch_is_abandoned() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);

    // Upstream that never answers: the capture can only end via cancellation.
    let router = Router::new().route(
        "/cdn/stuck",
        get(|| async {
            std::future::pending::<()>().await;
            ""
        }),
    );
    let server = siphon_test_utils::TestHttpServer::new(router).await;

    let cancel = CancellationToken::new();
    let client = HubClient::new(server.base_url().clone(), &NetOptions::default()).unwrap();
    let fetcher = BackgroundFetcher::new(client, Arc::clone(&sink), cancel.clone());

    fetcher.spawn(file_spec("feedface"), server.url("/cdn/stuck"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fetcher.in_flight(), 1);

    cancel.cancel();
    fetcher.shutdown().await;

    assert!(sink.store().blobs().open(&model(), "feedface").is_err());
}

#[rstest]
#[timeout(Duration::from_secs(10))]
#[tokio::test]
async fn failed_background_fetch_is_logged_not_fatal() {
    let dir = TempDir::new().unwrap();
    let sink = sink(&dir);

    let router = Router::new(); // every path 404s
    let server = siphon_test_utils::TestHttpServer::new(router).await;

    let cancel = CancellationToken::new();
    let client = HubClient::new(server.base_url().clone(), &NetOptions::default()).unwrap();
    let fetcher = BackgroundFetcher::new(client, Arc::clone(&sink), cancel);

    fetcher.spawn(file_spec("feedface"), server.url("/cdn/missing"));
    fetcher.shutdown().await;

    assert!(sink.store().blobs().open(&model(), "feedface").is_err());
}
