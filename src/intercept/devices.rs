//! Device model records and owned-device rewriting.
//!
//! Owned devices are redirected to the interception host: their advertised
//! location and MAC address are replaced before the client sees them, and an
//! RTSP shortcut to the real camera is kept locally.

use axum::body::Body;
use axum::response::Response;
use serde_json::Value;

use crate::config::InterceptionConfig;
use crate::http::request::InboundRequest;
use crate::http::response;
use crate::intercept::{entries, scalar_text, Services};

/// RTSP URL of a device as reported by the upstream, before rewriting.
pub fn rtsp_url(device: &Value, config: &InterceptionConfig) -> Option<String> {
    let credentials = device.get("p2p_credentials")?;
    let id = scalar_text(credentials.get("p2pId")?)?;
    let key = scalar_text(credentials.get("p2pKey")?)?;
    let ip = scalar_text(device.pointer("/device_location/local_ip")?)?;
    Some(format!(
        "rtsp://{}:{}@{}:{}/{}",
        id, key, ip, config.rtsp_port, config.rtsp_path
    ))
}

/// Point `device` at the interception host.
///
/// Returns the RTSP URL computed from the original location.
pub fn rewrite_device(device: &mut Value, config: &InterceptionConfig) -> Option<String> {
    let url = rtsp_url(device, config);

    if let Some(location) = device
        .get_mut("device_location")
        .and_then(Value::as_object_mut)
    {
        location.insert("local_ip".into(), Value::String(config.device_ip.clone()));
        location.insert("remote_ip".into(), Value::String(config.device_ip.clone()));
        location.insert("local_port_1".into(), Value::String(config.device_port.clone()));
    }
    if let Some(device) = device.as_object_mut() {
        device.insert("mac_address".into(), Value::String(config.mac_address.clone()));
    }

    url
}

/// Relay the device model list and keep one `device_<registrationId>.json`
/// record per entry.
pub async fn device_models(services: &Services, url: &str, request: &InboundRequest) -> Response {
    tracing::info!(host = %request.host, "Requested device models");

    let reply = match services.relay.forward(url, request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(host = %request.host, error = %e, "Device models request failed");
            return response::upstream_failure(&e);
        }
    };

    if let Some(models) = reply.json() {
        for model in entries(&models) {
            let Some(id) = model.get("registrationId").and_then(scalar_text) else {
                continue;
            };
            match services
                .records
                .store(&format!("device_{id}.json"), model.to_string())
                .await
            {
                Ok(path) => tracing::info!(path = %path.display(), "Created device file"),
                Err(e) => tracing::warn!(registration_id = %id, error = %e, "Failed to store device file"),
            }
        }
    }

    response::upstream_success(&reply, Body::from(reply.body.clone()))
}

/// Relay the owned-device list, keep per-device records and shortcuts, and
/// answer with the rewritten document.
pub async fn own_devices(services: &Services, url: &str, request: &InboundRequest) -> Response {
    tracing::info!(host = %request.host, "Requested owned devices");

    let reply = match services.relay.forward(url, request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(host = %request.host, error = %e, "Owned devices request failed");
            return response::upstream_failure(&e);
        }
    };

    let Some(mut document) = reply.json() else {
        tracing::warn!("Owned devices reply is not JSON; relayed unchanged");
        return response::upstream_success(&reply, Body::from(reply.body.clone()));
    };

    let devices: Vec<&mut Value> = match document.get_mut("data") {
        Some(Value::Array(items)) => items.iter_mut().collect(),
        Some(Value::Object(map)) => map.values_mut().collect(),
        _ => Vec::new(),
    };

    for device in devices {
        let shortcut = rewrite_device(device, &services.interception);

        if let (Some(url), Some(name)) = (shortcut, device.get("name").and_then(scalar_text)) {
            match services.records.store(&format!("url_{name}.txt"), url).await {
                Ok(path) => tracing::info!(path = %path.display(), "Created url file"),
                Err(e) => tracing::warn!(device = %name, error = %e, "Failed to store url file"),
            }
        }

        if let Some(id) = device.get("registration_id").and_then(scalar_text) {
            match services
                .records
                .store(&format!("own_{id}.json"), device.to_string())
                .await
            {
                Ok(path) => tracing::info!(path = %path.display(), "Created owner file"),
                Err(e) => tracing::warn!(registration_id = %id, error = %e, "Failed to store owner file"),
            }
        }
    }

    response::json_ok(document)
}
