//! SNI-driven TLS termination.
//!
//! # Responsibilities
//! - Load certificate/key pairs once at startup
//! - Map each virtual hostname to exactly one identity
//! - Select the identity during the handshake from the ClientHello's SNI
//! - Hand the negotiated server name to the HTTP layer
//!
//! # Design Decisions
//! - Missing or unknown server names get no certificate; rustls aborts the
//!   handshake with the same alert for every such name
//! - Hostnames match exactly, case-insensitively; no wildcards
//! - Only HTTP/1.1 is negotiated, so a connection serves a single host

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::middleware::AddExtension;
use axum::Extension;
use axum_server::accept::Accept;
use futures_util::future::BoxFuture;
use rustls::pki_types::CertificateDer;
use rustls::server::{Acceptor, ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::ServerConfig;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tokio_rustls::LazyConfigAcceptor;
use tower::Layer;

use crate::config::{ProxyConfig, TlsConfig};
use crate::http::request::TlsServerName;
use crate::net::connection::{ConnectionLifecycle, ConnectionState};
use crate::observability::metrics;

/// Errors raised while building TLS state.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("unusable private key in {path}: {source}")]
    InvalidKey {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("host '{0}' already has a secure context")]
    DuplicateHost(String),

    #[error("no secure context for host '{0}'")]
    UnknownHost(String),

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

fn normalize(hostname: &str) -> String {
    hostname.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Load a PEM certificate chain and private key.
pub fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Arc<CertifiedKey>, TlsError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })
    };
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;

    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<CertificateDer<'static>>, _>>()
        .map_err(|source| TlsError::Read {
            path: cert_path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .map_err(|source| TlsError::Read {
            path: key_path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(key_path.to_path_buf()))?;
    let signing_key = rustls::crypto::aws_lc_rs::sign::any_supported_type(&key).map_err(
        |source| TlsError::InvalidKey {
            path: key_path.to_path_buf(),
            source,
        },
    )?;

    Ok(Arc::new(CertifiedKey::new(certs, signing_key)))
}

/// Hostname → identity map consulted during every handshake.
#[derive(Debug, Default)]
pub struct SecureContextRegistry {
    identities: HashMap<String, Arc<CertifiedKey>>,
}

impl SecureContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for every configured host. Hosts without their own
    /// pair share the default one; each distinct pair is loaded once.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, TlsError> {
        let mut loaded: HashMap<&TlsConfig, Arc<CertifiedKey>> = HashMap::new();
        let mut registry = Self::new();

        for host in &config.hosts {
            let tls = host.tls.as_ref().unwrap_or(&config.tls);
            let identity = match loaded.get(tls) {
                Some(identity) => identity.clone(),
                None => {
                    let identity =
                        load_identity(Path::new(&tls.cert_path), Path::new(&tls.key_path))?;
                    tracing::debug!(cert = %tls.cert_path, "Loaded certificate");
                    loaded.insert(tls, identity.clone());
                    identity
                }
            };
            registry.register(&host.hostname, identity)?;
        }

        Ok(registry)
    }

    pub fn register(&mut self, hostname: &str, identity: Arc<CertifiedKey>) -> Result<(), TlsError> {
        let name = normalize(hostname);
        if self.identities.contains_key(&name) {
            return Err(TlsError::DuplicateHost(name));
        }
        self.identities.insert(name, identity);
        Ok(())
    }

    pub fn resolve(&self, hostname: &str) -> Result<Arc<CertifiedKey>, TlsError> {
        let name = normalize(hostname);
        self.identities
            .get(&name)
            .cloned()
            .ok_or(TlsError::UnknownHost(name))
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.identities.contains_key(&normalize(hostname))
    }

    /// Registered hostnames, sorted.
    pub fn hostnames(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.identities.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}

/// Certificate resolver backed by a [`SecureContextRegistry`].
#[derive(Debug)]
pub struct SniResolver {
    registry: Arc<SecureContextRegistry>,
}

impl SniResolver {
    pub fn new(registry: Arc<SecureContextRegistry>) -> Self {
        Self { registry }
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let name = client_hello.server_name()?;
        self.registry.resolve(name).ok()
    }
}

/// rustls server configuration selecting certificates by SNI.
pub fn server_config(registry: Arc<SecureContextRegistry>) -> Result<Arc<ServerConfig>, TlsError> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(SniResolver::new(registry)));
    // No h2: every request of a connection is routed by its SNI name, and
    // h2 clients reuse one connection for all names a certificate covers.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// `axum-server` acceptor that terminates TLS and tags every request of the
/// connection with its [`TlsServerName`].
#[derive(Debug, Clone)]
pub struct SniAcceptor {
    registry: Arc<SecureContextRegistry>,
    config: Arc<ServerConfig>,
    handshake_timeout: Duration,
}

impl SniAcceptor {
    pub fn new(registry: Arc<SecureContextRegistry>, handshake_timeout: Duration) -> Result<Self, TlsError> {
        let config = server_config(registry.clone())?;
        Ok(Self {
            registry,
            config,
            handshake_timeout,
        })
    }

    async fn handshake<I>(
        &self,
        stream: I,
        conn: &mut ConnectionLifecycle,
    ) -> io::Result<(TlsStream<I>, String)>
    where
        I: AsyncRead + AsyncWrite + Unpin,
    {
        let start = LazyConfigAcceptor::new(Acceptor::default(), stream).await?;
        let requested = start.client_hello().server_name().map(normalize);

        let name = match requested {
            Some(name) if self.registry.contains(&name) => {
                conn.advance(ConnectionState::ContextResolved)
                    .map_err(io::Error::other)?;
                name
            }
            other => {
                conn.advance(ConnectionState::NoMatchingContext)
                    .map_err(io::Error::other)?;
                tracing::warn!(
                    connection_id = %conn.id(),
                    server_name = other.as_deref().unwrap_or("<none>"),
                    "No secure context for requested server name"
                );
                // The resolver finds nothing, so rustls sends the failure alert.
                let _ = start.into_stream(self.config.clone()).await;
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "no secure context for server name",
                ));
            }
        };

        let tls = start.into_stream(self.config.clone()).await?;
        conn.advance(ConnectionState::HandshakeComplete)
            .map_err(io::Error::other)?;
        Ok((tls, name))
    }
}

impl<I, S> Accept<I, S> for SniAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, TlsServerName>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.clone();

        Box::pin(async move {
            let mut conn = ConnectionLifecycle::new();
            let outcome =
                tokio::time::timeout(acceptor.handshake_timeout, acceptor.handshake(stream, &mut conn))
                    .await
                    .unwrap_or_else(|_| {
                        Err(io::Error::new(io::ErrorKind::TimedOut, "TLS handshake timed out"))
                    });

            let (tls, name) = match outcome {
                Ok(accepted) => accepted,
                Err(e) => {
                    let rejected = conn.state() == ConnectionState::NoMatchingContext;
                    metrics::record_handshake(if rejected { "rejected" } else { "failed" });
                    tracing::debug!(connection_id = %conn.id(), error = %e, "TLS handshake failed");
                    conn.close();
                    return Err(e);
                }
            };
            metrics::record_handshake("accepted");

            conn.advance(ConnectionState::RequestDispatch)
                .map_err(io::Error::other)?;
            tracing::debug!(connection_id = %conn.id(), server_name = %name, "TLS connection established");

            let service = Extension(TlsServerName(name)).layer(service);
            Ok((tls, service))
        })
    }
}
