//! Session store: authentication results persisted by issued token.
//!
//! One file per token (`user_<token>.json`) holding the upstream's full
//! authentication payload. Reads project the record onto a fixed allow-list.
//! Sessions never expire; a file lives until removed externally.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::storage::atomic::{validate_name, write_atomic, KeyedLocks};

/// Errors raised by the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No authentication was recorded for this token.
    #[error("no session for token")]
    NotFound,

    #[error("token cannot be used as a session key")]
    InvalidToken,

    #[error("session record is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("session storage failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Public view of a session: the allow-listed fields of `record.data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authentication_token: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurly_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Value>,
    #[serde(rename = "packageName", skip_serializing_if = "Option::is_none")]
    pub package_name: Option<Value>,
}

impl SessionProfile {
    /// Project a full authentication record. Fields outside the allow-list
    /// are dropped.
    pub fn from_record(record: &Value) -> Self {
        match record.get("data") {
            Some(data @ Value::Object(_)) => {
                serde_json::from_value(data.clone()).unwrap_or_default()
            }
            _ => Self::default(),
        }
    }
}

/// Token issued by the upstream in an authentication payload.
pub fn issued_token(record: &Value) -> Option<&str> {
    record
        .get("data")
        .and_then(|d| d.get("authentication_token"))
        .and_then(Value::as_str)
}

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    locks: Arc<KeyedLocks>,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_name(token: &str) -> String {
        format!("user_{}.json", token)
    }

    fn path_for(&self, token: &str) -> Result<PathBuf, SessionError> {
        let name = Self::file_name(token);
        validate_name(&name).map_err(|_| SessionError::InvalidToken)?;
        if token.is_empty() {
            return Err(SessionError::InvalidToken);
        }
        Ok(self.root.join(name))
    }

    /// Persist the full authentication payload under `token`.
    pub async fn save(&self, token: &str, record: &Value) -> Result<PathBuf, SessionError> {
        let path = self.path_for(token)?;
        let contents = serde_json::to_vec(record)?;

        let _guard = self.locks.lock(token).await;
        write_atomic(&path, &contents).await?;

        tracing::debug!(path = %path.display(), "Session saved");
        Ok(path)
    }

    /// Full record stored for `token`.
    pub async fn load(&self, token: &str) -> Result<Value, SessionError> {
        let path = self.path_for(token)?;
        let contents = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound)
            }
            Err(e) => return Err(SessionError::Io(e)),
        };
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Allow-listed view of the record stored for `token`.
    pub async fn profile(&self, token: &str) -> Result<SessionProfile, SessionError> {
        let record = self.load(token).await?;
        Ok(SessionProfile::from_record(&record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "status": 200,
            "data": {
                "uuid": "u-1",
                "name": "Jo",
                "email": "jo@example.test",
                "roles": ["user"],
                "authentication_token": "tok123",
                "id": 7,
                "recurly_id": "r-9",
                "created_at": "2020-01-01",
                "updated_at": "2020-01-02",
                "packageName": "basic",
                "password_hint": "secret"
            }
        })
    }

    #[test]
    fn projection_keeps_only_allow_list() {
        let profile = SessionProfile::from_record(&record());
        let value = serde_json::to_value(&profile).unwrap();

        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            vec![
                "authentication_token",
                "created_at",
                "id",
                "name",
                "packageName",
                "recurly_id",
                "roles",
                "updated_at",
                "uuid"
            ]
        );
        assert_eq!(value["id"], json!(7));
    }

    #[test]
    fn projection_of_malformed_record_is_empty() {
        assert_eq!(SessionProfile::from_record(&json!({"data": 5})), SessionProfile::default());
        assert_eq!(SessionProfile::from_record(&json!([])), SessionProfile::default());
    }

    #[test]
    fn issued_token_reads_data_field() {
        assert_eq!(issued_token(&record()), Some("tok123"));
        assert_eq!(issued_token(&json!({"data": {}})), None);
    }

    #[tokio::test]
    async fn invalid_tokens_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());

        assert!(matches!(store.load("").await, Err(SessionError::InvalidToken)));
        assert!(matches!(
            store.save("../x", &record()).await,
            Err(SessionError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn corrupt_record_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path());
        std::fs::write(dir.path().join("user_bad.json"), b"{not json").unwrap();

        assert!(matches!(store.load("bad").await, Err(SessionError::Corrupt(_))));
    }
}
