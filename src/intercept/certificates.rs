//! Certificate capture from device and user configuration replies.
//!
//! Downloads start only after the client has its answer and never affect it.

use serde_json::Value;

use crate::http::request::InboundRequest;
use crate::relay::{on_success, CallbackError, SuccessCallback};
use crate::storage::ArtifactCache;

/// Reply field → local file suffix.
const CERTIFICATE_PARTS: [(&str, &str); 3] = [
    ("ca_crt", "ca.crt"),
    ("client_crt", "client.crt"),
    ("client_key", "client.key"),
];

/// Start one background download per certificate part found in `section`.
/// Returns how many were started.
fn spawn_downloads(certs: &ArtifactCache, section: &Value, prefix: &str) -> usize {
    let mut started = 0;
    for (field, suffix) in CERTIFICATE_PARTS {
        match section.get(field).and_then(Value::as_str) {
            Some(url) if !url.is_empty() => {
                certs.spawn_fetch(url.to_string(), format!("{prefix}{suffix}"), field);
                started += 1;
            }
            _ => tracing::warn!(field, "Certificate reference missing from reply"),
        }
    }
    started
}

fn section<'a>(payload: &'a Value, pointer: &str) -> Result<&'a Value, CallbackError> {
    payload
        .pointer(pointer)
        .ok_or_else(|| format!("reply has no {pointer}").into())
}

/// Callback downloading `data.certificate_data.*` as
/// `device_<device_token>_{ca.crt,client.crt,client.key}`.
///
/// `None` when the request names no `device_token`; the reply is still relayed.
pub fn device_certificates(certs: &ArtifactCache, request: &InboundRequest) -> Option<SuccessCallback> {
    let Some(device_token) = request.query("device_token") else {
        tracing::warn!(host = %request.host, "Device config requested without device_token");
        return None;
    };
    tracing::info!(host = %request.host, device_token = %device_token, "Requested device config");

    let certs = certs.clone();
    Some(on_success(move |payload| async move {
        let section = section(&payload, "/data/certificate_data")?;
        spawn_downloads(&certs, section, &format!("device_{device_token}_"));
        Ok::<(), CallbackError>(())
    }))
}

/// Callback downloading `data.mqtt_certificates.*` as
/// `mqtt_{ca.crt,client.crt,client.key}`.
pub fn mqtt_certificates(certs: &ArtifactCache) -> SuccessCallback {
    let certs = certs.clone();
    on_success(move |payload| async move {
        let section = section(&payload, "/data/mqtt_certificates")?;
        spawn_downloads(&certs, section, "mqtt_");
        Ok::<(), CallbackError>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_section_fails_the_callback() {
        let certs = ArtifactCache::new("/nonexistent", reqwest::Client::new());
        let callback = mqtt_certificates(&certs);
        let err = callback(json!({"data": {}})).await.unwrap_err();
        assert!(err.to_string().contains("mqtt_certificates"));
    }

    #[tokio::test]
    async fn only_present_parts_are_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let certs = ArtifactCache::new(dir.path(), reqwest::Client::new());
        let section = json!({"ca_crt": "http://127.0.0.1:1/ca", "client_crt": ""});
        assert_eq!(spawn_downloads(&certs, &section, "mqtt_"), 1);
    }
}
