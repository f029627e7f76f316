//! Front-end setup.
//!
//! # Responsibilities
//! - Build the secure context registry, relay, storage and dispatcher
//! - Serve the TLS front-end (SNI-selected identities) and the plaintext
//!   front-end on their own ports
//! - Start the echo listeners
//! - Wire up middleware (request ID, tracing)
//! - Stop everything on the shutdown signal

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::Handle;
use thiserror::Error;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ProxyConfig;
use crate::http::dispatch::{dispatch_plain, dispatch_tls, DispatchError, Dispatcher, VirtualHost};
use crate::intercept::{build_routes, RouteBuildError, Services};
use crate::net::echo::{bind_echo, run_echo};
use crate::net::tls::{SecureContextRegistry, SniAcceptor, TlsError};
use crate::relay::{Relay, UpstreamError};

/// Time allowed for a client to complete the TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Time in-flight requests get to finish after shutdown is signalled.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("route setup failed: {0}")]
    Routes(#[from] RouteBuildError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("invalid {field} address '{value}'")]
    Address { field: &'static str, value: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ServerError> {
    value.parse().map_err(|_| ServerError::Address {
        field,
        value: value.to_string(),
    })
}

/// Request-id and tracing layers shared by both front-ends.
fn with_middleware(router: Router) -> Router {
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

/// The intercepting proxy: both front-ends over one dispatcher.
pub struct ProxyServer {
    config: ProxyConfig,
    registry: Arc<SecureContextRegistry>,
    dispatcher: Arc<Dispatcher>,
}

impl ProxyServer {
    /// Load identities and build every virtual host. Fails fast on any error.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let registry = Arc::new(SecureContextRegistry::from_config(&config)?);
        let relay = Relay::new(&config.upstream)?;
        let services = Arc::new(Services::new(&config, relay));

        let mut dispatcher = Dispatcher::new(config.security.max_body_size)
            .with_static_dir(&config.storage.certs_dir);
        for host in &config.hosts {
            let routes = build_routes(host, &services)?;
            tracing::info!(
                host = %host.hostname,
                upstream = %host.upstream_base(),
                routes = routes.len(),
                "Registered virtual host"
            );
            dispatcher.add_host(VirtualHost::new(&host.hostname, routes))?;
        }

        Ok(Self {
            config,
            registry,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn registry(&self) -> &SecureContextRegistry {
        &self.registry
    }

    /// Application of the TLS front-end.
    pub fn tls_app(&self) -> Router {
        with_middleware(
            Router::new()
                .fallback(dispatch_tls)
                .with_state(self.dispatcher.clone()),
        )
    }

    /// Application of the plaintext front-end.
    pub fn plain_app(&self) -> Router {
        with_middleware(
            Router::new()
                .fallback(dispatch_plain)
                .with_state(self.dispatcher.clone()),
        )
    }

    /// Serve the TLS front-end on `addr` until `handle` shuts it down.
    pub async fn serve_https(&self, addr: SocketAddr, handle: Handle) -> Result<(), ServerError> {
        let acceptor = SniAcceptor::new(self.registry.clone(), TLS_HANDSHAKE_TIMEOUT)?;
        tracing::info!(address = %addr, hosts = ?self.registry.hostnames(), "HTTPS front-end starting");

        axum_server::bind(addr)
            .acceptor(acceptor)
            .handle(handle)
            .serve(self.tls_app().into_make_service())
            .await?;

        tracing::info!(address = %addr, "HTTPS front-end stopped");
        Ok(())
    }

    /// Serve the plaintext front-end on `addr` until `handle` shuts it down.
    pub async fn serve_http(&self, addr: SocketAddr, handle: Handle) -> Result<(), ServerError> {
        tracing::info!(address = %addr, "HTTP front-end starting");

        axum_server::bind(addr)
            .handle(handle)
            .serve(self.plain_app().into_make_service())
            .await?;

        tracing::info!(address = %addr, "HTTP front-end stopped");
        Ok(())
    }

    /// Run every listener until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<(), ServerError> {
        let listener = &self.config.listener;
        let https_addr = parse_addr("https", &listener.https_address)?;
        let http_addr = parse_addr("http", &listener.http_address)?;

        // Bind every echo port before spawning any, so a bind failure leaves
        // nothing running.
        let mut echo_sockets = Vec::with_capacity(listener.echo_ports.len());
        for &port in &listener.echo_ports {
            let socket = bind_echo(&listener.echo_bind_ip, port)
                .await
                .map_err(|source| ServerError::Bind {
                    address: format!("{}:{}", listener.echo_bind_ip, port),
                    source,
                })?;
            echo_sockets.push(socket);
        }
        let echo_tasks: Vec<_> = echo_sockets
            .into_iter()
            .map(|socket| tokio::spawn(run_echo(socket, shutdown.resubscribe())))
            .collect();

        let https_handle = Handle::new();
        let http_handle = Handle::new();
        tokio::spawn({
            let https_handle = https_handle.clone();
            let http_handle = http_handle.clone();
            async move {
                let _ = shutdown.recv().await;
                tracing::info!("Stopping front-ends");
                https_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
                http_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            }
        });

        let served = tokio::try_join!(
            self.serve_https(https_addr, https_handle.clone()),
            self.serve_http(http_addr, http_handle.clone()),
        );
        if served.is_err() {
            https_handle.shutdown();
            http_handle.shutdown();
        }

        for task in echo_tasks {
            if served.is_err() {
                task.abort();
            }
            let _ = task.await;
        }
        served.map(|_| ())
    }
}
