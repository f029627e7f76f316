//! Client response construction.
//!
//! # Responsibilities
//! - Fixed not-found answer for unmatched requests
//! - Map relay outcomes onto client responses
//! - JSON envelopes for synthesized answers
//!
//! # Design Decisions
//! - Upstream failures always surface as 400, with the upstream payload
//!   when there is one
//! - Successful relays always surface as 200, whatever 2xx the upstream sent

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::relay::{UpstreamError, UpstreamReply};

/// Body of every not-found answer.
pub const NOT_FOUND_BODY: &str = "Sorry can't find that!";

pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

/// 200 carrying `body`, typed and sized like the upstream reply.
pub fn upstream_success(reply: &UpstreamReply, body: Body) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Some(content_type) = &reply.content_type {
        headers.insert(header::CONTENT_TYPE, content_type.clone());
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(reply.body.len()));
    response
}

/// 400 describing why the relay failed.
pub fn upstream_failure(err: &UpstreamError) -> Response {
    match err {
        UpstreamError::Status {
            content_type, body, ..
        } if !body.is_empty() => {
            let mut response = Response::new(Body::from(body.clone()));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            if let Some(content_type) = content_type {
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, content_type.clone());
            }
            response
        }
        other => json_error(StatusCode::BAD_REQUEST, &other.to_string()),
    }
}

/// `{"status": <code>, "message": <message>}` with the same status.
pub fn json_error(status: StatusCode, message: &str) -> Response {
    let body = json!({
        "status": status.as_u16(),
        "message": message,
    });
    (status, Json(body)).into_response()
}

/// `{"status": 200, "message": "", "data": <data>}`.
pub fn json_envelope<T: Serialize>(data: T) -> Response {
    let data = match serde_json::to_value(data) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode response data");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error");
        }
    };
    Json(json!({
        "status": 200,
        "message": "",
        "data": data,
    }))
    .into_response()
}

/// 200 with a JSON body.
pub fn json_ok(value: Value) -> Response {
    Json(value).into_response()
}
