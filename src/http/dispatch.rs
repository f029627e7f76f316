//! Virtual host dispatch.
//!
//! # Responsibilities
//! - Select the virtual host by exact hostname
//! - Serve the certificate directory under `/certs/` on every host
//! - Match the host's route table and hand the buffered request to its handler
//! - Answer every miss with the same fixed 404
//!
//! # Design Decisions
//! - Host tables are built once at startup and never mutated
//! - The hostname source (SNI or `Host` header) is carried to the logs but
//!   never influences the lookup itself

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use axum::Extension;
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeDir;

use crate::http::request::{host_header_name, InboundRequest, RequestHost, TlsServerName};
use crate::http::response;
use crate::observability::metrics::{self, RouteMiss};
use crate::routing::RouteTable;

/// Prefix under which the certificate directory is exposed.
pub const STATIC_PREFIX: &str = "/certs/";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("virtual host '{0}' registered twice")]
    DuplicateHost(String),
}

/// One hostname and its isolated route table.
#[derive(Debug, Clone)]
pub struct VirtualHost {
    hostname: String,
    routes: RouteTable,
}

impl VirtualHost {
    pub fn new(hostname: &str, routes: RouteTable) -> Self {
        Self {
            hostname: normalize(hostname),
            routes,
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Routes requests to the virtual host named by the front-end.
#[derive(Debug)]
pub struct Dispatcher {
    hosts: HashMap<String, VirtualHost>,
    static_dir: Option<PathBuf>,
    max_body_size: usize,
}

impl Dispatcher {
    pub fn new(max_body_size: usize) -> Self {
        Self {
            hosts: HashMap::new(),
            static_dir: None,
            max_body_size,
        }
    }

    /// Expose `dir` read-only under `/certs/` on every host.
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = Some(dir.into());
        self
    }

    pub fn add_host(&mut self, host: VirtualHost) -> Result<(), DispatchError> {
        if self.hosts.contains_key(host.hostname()) {
            return Err(DispatchError::DuplicateHost(host.hostname));
        }
        self.hosts.insert(host.hostname.clone(), host);
        Ok(())
    }

    pub fn host(&self, hostname: &str) -> Option<&VirtualHost> {
        self.hosts.get(&normalize(hostname))
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Answer `request` for the virtual host named by `host`.
    pub async fn dispatch(&self, host: RequestHost, request: Request) -> Response {
        let start = Instant::now();
        let method = request.method().clone();

        let Some(vhost) = self.host(host.name()) else {
            tracing::info!(
                host = %host,
                source = host.source(),
                method = %method,
                path = %request.uri().path(),
                "No virtual host for request"
            );
            metrics::record_route_miss(RouteMiss::Host);
            let response = response::not_found();
            metrics::record_request(method.as_str(), response.status().as_u16(), "none", start);
            return response;
        };

        let response = self.dispatch_to(vhost, host, request).await;
        metrics::record_request(
            method.as_str(),
            response.status().as_u16(),
            vhost.hostname(),
            start,
        );
        response
    }

    async fn dispatch_to(&self, vhost: &VirtualHost, host: RequestHost, request: Request) -> Response {
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        if let (Some(dir), Some(rest)) = (&self.static_dir, static_target(&method, &path)) {
            return serve_static(dir, rest, request).await;
        }

        let Some((route, params)) = vhost.routes().match_route(&method, &path) else {
            tracing::info!(
                host = %host,
                source = host.source(),
                method = %method,
                path = %path,
                "No route matched"
            );
            metrics::record_route_miss(RouteMiss::Route);
            return response::not_found();
        };
        let handler = route.handler().clone();

        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, self.max_body_size).await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!(host = %host, path = %path, error = %e, "Request body rejected");
                return response::json_error(
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "request body could not be read within the size limit",
                );
            }
        };

        tracing::debug!(host = %host, source = host.source(), method = %method, path = %path, "Dispatching request");

        let inbound = InboundRequest {
            host,
            method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            params,
        };
        handler.call(inbound).await
    }
}

/// Path below the static prefix, for GET and HEAD requests only.
fn static_target<'a>(method: &Method, path: &'a str) -> Option<&'a str> {
    if *method != Method::GET && *method != Method::HEAD {
        return None;
    }
    path.strip_prefix(STATIC_PREFIX).filter(|rest| !rest.is_empty())
}

async fn serve_static(dir: &Path, rest: &str, request: Request) -> Response {
    let Ok(uri) = format!("/{rest}").parse::<Uri>() else {
        return response::not_found();
    };
    let (mut parts, body) = request.into_parts();
    parts.uri = uri;

    let service = ServeDir::new(dir).append_index_html_on_directories(false);
    let response = match service.oneshot(Request::from_parts(parts, body)).await {
        Ok(response) => response,
        Err(never) => match never {},
    };

    if response.status() == StatusCode::NOT_FOUND {
        return response::not_found();
    }
    response.map(Body::new)
}

/// Fallback handler of the TLS front-end: dispatch by negotiated server name.
pub async fn dispatch_tls(
    State(dispatcher): State<Arc<Dispatcher>>,
    Extension(TlsServerName(name)): Extension<TlsServerName>,
    request: Request,
) -> Response {
    dispatcher
        .dispatch(RequestHost::TlsServerName(name), request)
        .await
}

/// Fallback handler of the plaintext front-end: dispatch by `Host` header.
pub async fn dispatch_plain(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    match host_header_name(request.headers(), request.uri()) {
        Some(name) => dispatcher.dispatch(RequestHost::HostHeader(name), request).await,
        None => {
            tracing::info!(path = %request.uri().path(), "Request without a host");
            response::not_found()
        }
    }
}
