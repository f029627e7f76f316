//! Interception handlers.
//!
//! # Data Flow
//! ```text
//! Matched route (kind from configuration)
//!     → passthrough            relay verbatim
//!     → authentication_token   relay, persist session, answer
//!     → me                     answer from the session store
//!     → device_config          relay, answer, then download device certificates
//!     → user_certificates      relay, answer, then download MQTT certificates
//!     → device_models          relay, persist one record per model, answer
//!     → own_devices            relay, persist and rewrite devices, answer rewritten
//!     → static_json            fixed body
//! ```

pub mod auth;
pub mod certificates;
pub mod devices;

use std::sync::Arc;

use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::config::{HostConfig, InterceptionConfig, ProxyConfig, RouteConfig, RouteKind};
use crate::http::request::InboundRequest;
use crate::http::response;
use crate::relay::Relay;
use crate::routing::matcher::PatternError;
use crate::routing::{PathPattern, Route, RouteHandler, RouteTable};
use crate::storage::{ArtifactCache, SessionStore};

/// Shared collaborators of every handler.
#[derive(Debug, Clone)]
pub struct Services {
    pub relay: Relay,
    /// Downloaded certificates; the directory exposed under `/certs`.
    pub certs: ArtifactCache,
    /// Derived device records and RTSP shortcut files.
    pub records: ArtifactCache,
    pub sessions: SessionStore,
    pub interception: InterceptionConfig,
}

impl Services {
    /// Wire storage to the relay's client, so downloads follow the same
    /// certificate policy and timeouts as relayed requests.
    pub fn new(config: &ProxyConfig, relay: Relay) -> Self {
        let client = relay.client().clone();
        Self {
            certs: ArtifactCache::new(&config.storage.certs_dir, client.clone()),
            records: ArtifactCache::new(&config.storage.data_dir, client),
            sessions: SessionStore::new(&config.storage.data_dir),
            interception: config.interception.clone(),
            relay,
        }
    }
}

#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("invalid method '{0}'")]
    InvalidMethod(String),

    #[error("invalid path pattern '{path}': {source}")]
    InvalidPattern {
        path: String,
        #[source]
        source: PatternError,
    },
}

/// Where a relaying route sends its request.
#[derive(Debug, Clone)]
struct UpstreamTarget {
    base: String,
    path: Option<PathPattern>,
}

impl UpstreamTarget {
    /// Base URL, then the rendered template or the inbound path, then the
    /// inbound query string.
    fn url_for(&self, request: &InboundRequest) -> String {
        let path = match &self.path {
            Some(template) => template.render(&request.params),
            None => request.path().to_string(),
        };
        match request.query_string() {
            Some(query) => format!("{}{}?{}", self.base, path, query),
            None => format!("{}{}", self.base, path),
        }
    }
}

/// Handler bound to one configured route.
#[derive(Debug, Clone)]
pub struct InterceptHandler {
    kind: RouteKind,
    upstream: UpstreamTarget,
    body: Option<Value>,
    services: Arc<Services>,
}

impl InterceptHandler {
    async fn handle(self, request: InboundRequest) -> Response {
        let services = &self.services;
        let url = self.upstream.url_for(&request);

        match self.kind {
            RouteKind::Passthrough => {
                tracing::info!(host = %request.host, path = %request.path(), "Passthrough");
                services.relay.relay(&url, &request, None).await
            }
            RouteKind::AuthenticationToken => {
                auth::authentication_token(services, &url, &request).await
            }
            RouteKind::Me => auth::me(&services.sessions, &request).await,
            RouteKind::DeviceConfig => {
                let callback = certificates::device_certificates(&services.certs, &request);
                services.relay.relay(&url, &request, callback).await
            }
            RouteKind::UserCertificates => {
                tracing::info!(host = %request.host, "Requested user certificates");
                let callback = certificates::mqtt_certificates(&services.certs);
                services.relay.relay(&url, &request, Some(callback)).await
            }
            RouteKind::DeviceModels => devices::device_models(services, &url, &request).await,
            RouteKind::OwnDevices => devices::own_devices(services, &url, &request).await,
            RouteKind::StaticJson => {
                tracing::info!(host = %request.host, path = %request.path(), "Fixed response");
                response::json_ok(self.body.clone().unwrap_or(Value::Null))
            }
        }
    }
}

impl RouteHandler for InterceptHandler {
    fn call(&self, request: InboundRequest) -> BoxFuture<'static, Response> {
        Box::pin(self.clone().handle(request))
    }
}

fn build_route(
    route: &RouteConfig,
    upstream_base: &str,
    services: &Arc<Services>,
) -> Result<Route, RouteBuildError> {
    let method = route
        .method
        .to_uppercase()
        .parse::<Method>()
        .map_err(|_| RouteBuildError::InvalidMethod(route.method.clone()))?;
    let pattern = |path: &str| {
        PathPattern::parse(path).map_err(|source| RouteBuildError::InvalidPattern {
            path: path.to_string(),
            source,
        })
    };

    let handler = InterceptHandler {
        kind: route.kind,
        upstream: UpstreamTarget {
            base: upstream_base.to_string(),
            path: route.upstream_path.as_deref().map(pattern).transpose()?,
        },
        body: route.body.clone(),
        services: services.clone(),
    };
    Ok(Route::new(method, pattern(&route.path)?, Arc::new(handler)))
}

/// Route table for one configured host, in configuration order.
pub fn build_routes(
    host: &HostConfig,
    services: &Arc<Services>,
) -> Result<RouteTable, RouteBuildError> {
    let base = host.upstream_base();
    let mut table = RouteTable::new();
    for route in &host.routes {
        table.push(build_route(route, &base, services)?);
    }
    Ok(table)
}

/// Text of a scalar JSON value.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Elements of a JSON array, or values of a JSON object.
pub(crate) fn entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}
