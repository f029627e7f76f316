//! Artifact cache and session store against real files.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use intercept_proxy::storage::{ArtifactCache, SessionError, SessionStore};
use serde_json::json;

mod common;

#[tokio::test]
async fn fetched_artifact_is_stored_under_local_name() {
    let backend = common::start_stub_backend(&[0xDE, 0xAD, 0xBE, 0xEF]).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());

    let url = format!("http://{}/blob", backend);
    let path = cache.fetch_and_store(&url, "test.bin").await.unwrap();

    assert_eq!(path, dir.path().join("test.bin"));
    assert_eq!(std::fs::read(&path).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
}

#[tokio::test]
async fn refetch_leaves_identical_file() {
    let backend = common::start_stub_backend(b"-----BEGIN CERTIFICATE-----").await;
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());
    let url = format!("http://{}/ca", backend);

    let first = cache.fetch_and_store(&url, "mqtt_ca.crt").await.unwrap();
    let before = std::fs::read(&first).unwrap();
    let second = cache.fetch_and_store(&url, "mqtt_ca.crt").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second).unwrap(), before);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[tokio::test]
async fn concurrent_fetches_of_one_name_never_interleave() {
    let calls = Arc::new(AtomicU32::new(0));
    let backend = common::start_programmable_backend({
        let calls = calls.clone();
        move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { (200, vec![b'a' + (n % 26) as u8; 64 * 1024]) }
        }
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());
    let url = format!("http://{}/key", backend);

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            let url = url.clone();
            tokio::spawn(async move { cache.fetch_and_store(&url, "mqtt_client.key").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let contents = std::fs::read(dir.path().join("mqtt_client.key")).unwrap();
    assert_eq!(contents.len(), 64 * 1024);
    assert!(contents.iter().all(|b| *b == contents[0]));
    assert_eq!(calls.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn failed_download_leaves_no_file() {
    let backend = common::start_programmable_backend(|| async { (404, b"gone".to_vec()) }).await;
    let dir = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());

    let result = cache
        .fetch_and_store(&format!("http://{}/missing", backend), "device_t_ca.crt")
        .await;

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn session_round_trips_by_token() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    let record = json!({
        "status": 200,
        "data": {
            "authentication_token": "tok123",
            "uuid": "u-1",
            "email": "jo@example.test",
            "packageName": "basic"
        }
    });

    let path = store.save("tok123", &record).await.unwrap();
    assert_eq!(path, dir.path().join("user_tok123.json"));
    assert_eq!(store.load("tok123").await.unwrap(), record);

    let profile = serde_json::to_value(store.profile("tok123").await.unwrap()).unwrap();
    assert_eq!(
        profile,
        json!({"authentication_token": "tok123", "uuid": "u-1", "packageName": "basic"})
    );
}

#[tokio::test]
async fn unknown_token_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path());
    assert!(matches!(store.load("unknown").await, Err(SessionError::NotFound)));
    assert!(matches!(store.profile("unknown").await, Err(SessionError::NotFound)));
}
