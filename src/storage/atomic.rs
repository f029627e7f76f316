//! Write-then-rename persistence with per-key locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A local file name that was rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid local name '{0}'")]
pub struct InvalidName(pub String);

/// Check that `name` is a single plain path component.
pub fn validate_name(name: &str) -> Result<(), InvalidName> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// One async mutex per key; writers of the same key queue, other keys proceed.
///
/// An entry lives only while some caller holds or waits for its lock.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            key: key.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Holds the lock of one key. Dropping it releases the lock and forgets the
/// key once nobody else is queued on it.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    locks: Arc<LockMap>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters clone the Arc under the shard lock, so a count of one
        // means the map holds the only reference.
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Temporary sibling of `target`, unique per call.
pub fn temp_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4().simple()))
}

/// Write `contents` to `target` through a temporary file and a rename, so
/// readers never observe a partial file.
pub async fn write_atomic(target: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let tmp = temp_path(target);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(contents).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, target).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}
