use std::io::Read;
use std::time::Duration;

use rstest::rstest;
use siphon_core::ModelId;
use siphon_store::{Distribution, EntryPath, LocalStore, StorageKind};
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> LocalStore {
    LocalStore::open(dir.path()).unwrap()
}

fn model() -> ModelId {
    ModelId::new("acme/foo").unwrap()
}

fn seed_snapshot(store: &LocalStore, model: &ModelId, sha: &str, filename: &str, etag: &str, content: &[u8]) {
    let mut w = store.blobs().writer(model, etag).unwrap();
    w.write(content).unwrap();
    w.commit().unwrap();
    store
        .snapshots()
        .materialize(model, sha, &EntryPath::new(filename).unwrap(), etag)
        .unwrap();
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn store_file_round_trips_bytes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let m = model();

    let data = b"uploaded weights";
    let path = store.store_file(&m, "weights.bin", &mut &data[..]).unwrap();

    let mut read_back = Vec::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_end(&mut read_back)
        .unwrap();
    assert_eq!(read_back, data);

    // The upload lands inside the encoded repo dir.
    assert!(path.ends_with("hub/models--acme--foo/weights.bin"));
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn captured_file_is_visible_and_byte_identical() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let m = model();

    seed_snapshot(&store, &m, "abc123", "config.json", "deadbeef", b"{\"layers\":12}");

    let stat = store
        .file_exists(&m, "abc123", "config.json")
        .unwrap()
        .expect("entry should exist");
    assert_eq!(stat.file_name, "config.json");
    assert_eq!(stat.size, 13);

    let mut content = Vec::new();
    store
        .get_file(&m, "abc123", "config.json")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"{\"layers\":12}");

    assert_eq!(
        store.file_etag(&m, "abc123", "config.json"),
        Some("deadbeef".to_string())
    );
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn get_file_missing_entry_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let err = store.get_file(&model(), "abc123", "missing.bin").unwrap_err();
    assert!(err.is_not_found(), "got: {err}");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn repo_sha_prefers_ref_and_falls_back_to_token() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let m = model();

    // No ref recorded: the raw token passes through unchanged.
    assert_eq!(store.repo_sha(&m, "main"), "main");
    assert_eq!(store.repo_sha(&m, "abc123"), "abc123");

    store.refs().record(&m, "main", "abc123").unwrap();
    assert_eq!(store.repo_sha(&m, "main"), "abc123");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn list_files_returns_plain_files_only() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let m = model();

    store.store_file(&m, "b.txt", &mut &b"bb"[..]).unwrap();
    store.store_file(&m, "a.txt", &mut &b"a"[..]).unwrap();
    seed_snapshot(&store, &m, "abc123", "config.json", "deadbeef", b"{}");

    let files = store.list_files(&m).unwrap();
    // snapshots/ and blobs/ directories are skipped; names come back sorted.
    assert_eq!(files, vec!["a.txt".to_string(), "b.txt".to_string()]);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn list_files_unknown_model_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let err = store.list_files(&model()).unwrap_err();
    assert!(err.is_not_found(), "got: {err}");
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn storage_info_sums_raw_top_level_sizes() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let m = model();

    store.store_file(&m, "a.txt", &mut &b"aaaa"[..]).unwrap();
    store.store_file(&m, "b.txt", &mut &b"bb"[..]).unwrap();

    assert_eq!(store.storage_info(&m).unwrap(), 6);
}

#[rstest]
#[timeout(Duration::from_secs(5))]
fn vcs_backend_reports_unimplemented() {
    let dir = TempDir::new().unwrap();
    let dist = siphon_store::open_distribution(StorageKind::Vcs, dir.path()).unwrap();
    let m = model();

    assert!(dist.repo_info(&m, "main").is_err());
    assert!(dist.list_files(&m).is_err());
    assert!(dist.get_file(&m, "abc", "f").is_err());
    // Token fallback still behaves.
    assert_eq!(dist.repo_sha(&m, "main"), "main");
}
