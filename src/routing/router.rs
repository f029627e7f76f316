//! Per-host route tables.
//!
//! # Responsibilities
//! - Store routes in registration order
//! - Look up the first route matching method + path
//! - Return matched route with its parameters, or explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - O(n) scan in registration order; first match wins, so an earlier
//!   duplicate shadows a later one
//! - Explicit NoMatch rather than silent default

use std::future::Future;
use std::sync::Arc;

use axum::http::Method;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::request::InboundRequest;
use crate::routing::matcher::{PathParams, PathPattern, RouteMatcher};

/// Something that turns a matched request into a response.
pub trait RouteHandler: Send + Sync {
    fn call(&self, request: InboundRequest) -> BoxFuture<'static, Response>;
}

impl<F, Fut> RouteHandler for F
where
    F: Fn(InboundRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, request: InboundRequest) -> BoxFuture<'static, Response> {
        Box::pin(self(request))
    }
}

/// A single registered route.
#[derive(Clone)]
pub struct Route {
    matcher: RouteMatcher,
    handler: Arc<dyn RouteHandler>,
}

impl Route {
    pub fn new(method: Method, pattern: PathPattern, handler: Arc<dyn RouteHandler>) -> Self {
        Self {
            matcher: RouteMatcher::new(method, pattern),
            handler,
        }
    }

    pub fn method(&self) -> &Method {
        self.matcher.method()
    }

    pub fn pattern(&self) -> &PathPattern {
        self.matcher.pattern()
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", self.method())
            .field("pattern", &self.pattern().as_str())
            .finish()
    }
}

/// Ordered route table of one virtual host.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route; it is tried after every route already registered.
    pub fn push(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Builder-style variant of [`RouteTable::push`].
    pub fn route<H>(mut self, method: Method, pattern: PathPattern, handler: H) -> Self
    where
        H: RouteHandler + 'static,
    {
        self.push(Route::new(method, pattern, Arc::new(handler)));
        self
    }

    /// First route matching method and path, with its captured parameters.
    pub fn match_route(&self, method: &Method, path: &str) -> Option<(&Route, PathParams)> {
        self.routes.iter().find_map(|route| {
            route
                .matcher
                .matches(method, path)
                .map(|params| (route, params))
        })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
