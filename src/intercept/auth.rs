//! Login capture and the `me` endpoint.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::http::request::InboundRequest;
use crate::http::response;
use crate::intercept::Services;
use crate::storage::sessions::issued_token;
use crate::storage::{SessionError, SessionStore};

/// `login` field of a JSON or form-encoded login body.
fn login_of(request: &InboundRequest) -> Option<String> {
    if let Some(body) = request.json_body() {
        return body.get("login").and_then(Value::as_str).map(str::to_string);
    }
    url::form_urlencoded::parse(&request.body)
        .find(|(key, _)| key == "login")
        .map(|(_, value)| value.into_owned())
}

/// Relay a login; persist the issued session before answering.
///
/// A failed save is logged and the client still receives the upstream reply.
pub async fn authentication_token(services: &Services, url: &str, request: &InboundRequest) -> Response {
    let login = login_of(request);
    tracing::info!(
        host = %request.host,
        login = login.as_deref().unwrap_or("<unknown>"),
        "Requested authentication token"
    );

    let reply = match services.relay.forward(url, request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(host = %request.host, error = %e, "Authentication failed");
            return response::upstream_failure(&e);
        }
    };

    match reply.json() {
        Some(record) => match issued_token(&record) {
            Some(token) => match services.sessions.save(token, &record).await {
                Ok(path) => {
                    tracing::info!(path = %path.display(), "Authentication succeeded, session stored")
                }
                Err(e) => tracing::error!(error = %e, "Failed to store session"),
            },
            None => tracing::warn!("Authentication reply carried no token"),
        },
        None => tracing::warn!("Authentication reply is not JSON"),
    }

    response::upstream_success(&reply, Body::from(reply.body.clone()))
}

/// Answer with the stored profile for the `api_key` query parameter.
pub async fn me(sessions: &SessionStore, request: &InboundRequest) -> Response {
    let Some(api_key) = request.query("api_key") else {
        return response::json_error(StatusCode::BAD_REQUEST, "missing api_key");
    };
    tracing::info!(host = %request.host, "Requested me.json");

    match sessions.profile(&api_key).await {
        Ok(profile) => response::json_envelope(profile),
        Err(SessionError::NotFound) => {
            tracing::info!(host = %request.host, "No session for api_key");
            response::json_error(StatusCode::NOT_FOUND, "unknown api_key")
        }
        Err(SessionError::InvalidToken) => {
            response::json_error(StatusCode::BAD_REQUEST, "invalid api_key")
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to read session");
            response::json_error(StatusCode::INTERNAL_SERVER_ERROR, "session could not be read")
        }
    }
}
