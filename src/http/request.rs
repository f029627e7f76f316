//! Inbound request model.
//!
//! # Responsibilities
//! - Carry the authoritative hostname together with the front-end that supplied it
//! - Buffer the request body once so handlers can relay it verbatim
//! - Expose query and path parameters to route handlers

use axum::body::Bytes;
use axum::http::{header, HeaderMap, Method, Uri};

use crate::routing::matcher::PathParams;

/// Header carrying the per-request id set by the request-id layer.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Server name negotiated during the TLS handshake.
///
/// Attached as a request extension to every request of a TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsServerName(pub String);

/// The hostname used for dispatch, labeled with where it came from.
///
/// The TLS front-end supplies the SNI name; the plaintext front-end supplies
/// the `Host` header. The two are never compared or reconciled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestHost {
    TlsServerName(String),
    HostHeader(String),
}

impl RequestHost {
    pub fn name(&self) -> &str {
        match self {
            RequestHost::TlsServerName(name) | RequestHost::HostHeader(name) => name,
        }
    }

    /// Label for logs.
    pub fn source(&self) -> &'static str {
        match self {
            RequestHost::TlsServerName(_) => "sni",
            RequestHost::HostHeader(_) => "host-header",
        }
    }
}

impl std::fmt::Display for RequestHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Hostname from the `Host` header (or the URI authority for HTTP/2),
/// lowercased and without a port.
pub fn host_header_name(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let raw = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()))?;

    let host = if let Some(rest) = raw.strip_prefix('[') {
        // IPv6 literal: keep the brackets, drop the port.
        let end = rest.find(']')?;
        &raw[..end + 2]
    } else {
        raw.split(':').next().unwrap_or(raw)
    };

    let host = host.trim().trim_end_matches('.').to_lowercase();
    (!host.is_empty()).then_some(host)
}

/// A fully buffered request handed to a route handler.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub host: RequestHost,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub params: PathParams,
}

impl InboundRequest {
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Raw query string, if any.
    pub fn query_string(&self) -> Option<&str> {
        self.uri.query().filter(|q| !q.is_empty())
    }

    /// First value of a decoded query parameter.
    pub fn query(&self, name: &str) -> Option<String> {
        let query = self.query_string()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    pub fn request_id(&self) -> &str {
        self.headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }

    /// Body decoded as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
