//! Artifact cache: remote blobs and derived records persisted under
//! deterministic local names.
//!
//! # Responsibilities
//! - Stream a remote reference into `<root>/<local_name>`
//! - Persist locally derived records (device JSON, RTSP shortcut files)
//! - Serialize writers of the same name; never expose partial files
//!
//! # Design Decisions
//! - Downloads stream into a temporary sibling and are renamed into place
//! - Re-fetching the same content yields a byte-identical file
//! - Nothing here is retried; callers treat failures as best-effort

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::observability::metrics;
use crate::storage::atomic::{temp_path, validate_name, write_atomic, InvalidName, KeyedLocks};

/// Errors raised while persisting an artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error(transparent)]
    InvalidName(#[from] InvalidName),

    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persists artifacts below a single root directory.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
    client: reqwest::Client,
    locks: Arc<KeyedLocks>,
}

impl ArtifactCache {
    pub fn new(root: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            root: root.into(),
            client,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic location of `local_name`.
    pub fn path_for(&self, local_name: &str) -> Result<PathBuf, ArtifactError> {
        validate_name(local_name)?;
        Ok(self.root.join(local_name))
    }

    /// Download `remote_url` and store the body as `local_name`.
    pub async fn fetch_and_store(
        &self,
        remote_url: &str,
        local_name: &str,
    ) -> Result<PathBuf, ArtifactError> {
        let target = self.path_for(local_name)?;
        let _guard = self.locks.lock(local_name).await;

        let download = |source| ArtifactError::Download {
            url: remote_url.to_string(),
            source,
        };
        let response = self
            .client
            .get(remote_url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(download)?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| ArtifactError::Write {
                path: self.root.clone(),
                source,
            })?;

        let tmp = temp_path(&target);
        let result = stream_to_file(response, &tmp, &target).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        match result {
            Ok(bytes) => {
                tracing::debug!(path = %target.display(), bytes, "Artifact stored");
                Ok(target)
            }
            Err(StreamFailure::Body(source)) => Err(download(source)),
            Err(StreamFailure::Io(source)) => Err(ArtifactError::Write {
                path: target,
                source,
            }),
        }
    }

    /// Store locally produced contents as `local_name`.
    pub async fn store(
        &self,
        local_name: &str,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, ArtifactError> {
        let target = self.path_for(local_name)?;
        let _guard = self.locks.lock(local_name).await;

        write_atomic(&target, contents.as_ref())
            .await
            .map_err(|source| ArtifactError::Write {
                path: target.clone(),
                source,
            })?;
        Ok(target)
    }

    /// Fetch in the background. Failures are logged and otherwise ignored.
    pub fn spawn_fetch(&self, remote_url: String, local_name: String, label: &'static str) {
        let cache = self.clone();
        tokio::spawn(async move {
            match cache.fetch_and_store(&remote_url, &local_name).await {
                Ok(path) => {
                    metrics::record_artifact_download(label, true);
                    tracing::info!(artifact = label, path = %path.display(), "Downloaded artifact");
                }
                Err(e) => {
                    metrics::record_artifact_download(label, false);
                    tracing::warn!(artifact = label, error = %e, "Artifact download failed");
                }
            }
        });
    }
}

enum StreamFailure {
    Body(reqwest::Error),
    Io(std::io::Error),
}

async fn stream_to_file(
    response: reqwest::Response,
    tmp: &Path,
    target: &Path,
) -> Result<u64, StreamFailure> {
    let mut file = tokio::fs::File::create(tmp).await.map_err(StreamFailure::Io)?;
    let mut written = 0u64;
    let mut chunks = response.bytes_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(StreamFailure::Body)?;
        file.write_all(&chunk).await.map_err(StreamFailure::Io)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(StreamFailure::Io)?;
    file.sync_all().await.map_err(StreamFailure::Io)?;
    drop(file);
    tokio::fs::rename(tmp, target).await.map_err(StreamFailure::Io)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_rejects_traversal() {
        let cache = ArtifactCache::new("/tmp/certs", reqwest::Client::new());
        assert_eq!(
            cache.path_for("mqtt_ca.crt").unwrap(),
            PathBuf::from("/tmp/certs/mqtt_ca.crt")
        );
        assert!(matches!(
            cache.path_for("../mqtt_ca.crt"),
            Err(ArtifactError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn store_overwrites_silently() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());

        cache.store("url_cam.txt", "rtsp://a").await.unwrap();
        let path = cache.store("url_cam.txt", "rtsp://b").await.unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "rtsp://b");
    }

    #[tokio::test]
    async fn unreachable_remote_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());

        let err = cache
            .fetch_and_store("http://127.0.0.1:1/ca.crt", "ca.crt")
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Download { .. }));
        assert!(!dir.path().join("ca.crt").exists());
    }

    #[tokio::test]
    async fn background_fetch_failures_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _local = ::metrics::set_default_local_recorder(&recorder);

        let dir = tempfile::tempdir().unwrap();
        let cache = ArtifactCache::new(dir.path(), reqwest::Client::new());
        cache.spawn_fetch("http://127.0.0.1:1/ca.crt".into(), "mqtt_ca.crt".into(), "ca_crt");

        let expected = r#"proxy_artifact_downloads_total{artifact="ca_crt",result="failure"} 1"#;
        for _ in 0..100 {
            if handle.render().contains(expected) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("download failure was not counted");
    }
}
