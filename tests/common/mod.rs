//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_server::Handle;
use intercept_proxy::config::parse_config;
use intercept_proxy::{ProxyConfig, ProxyServer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a stub backend that answers every request with `body`.
pub async fn start_stub_backend(body: &'static [u8]) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_vec()) }).await
}

/// Start a stub backend whose answer is computed per request.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, Vec<u8>)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Request heads in these tests fit in one read.
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            _ => "200 OK",
                        };
                        let head = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            status_text,
                            body.len()
                        );
                        let _ = socket.write_all(head.as_bytes()).await;
                        let _ = socket.write_all(&body).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// A self-signed identity for `host`, written as `<host>.crt` / `<host>.key`.
pub struct TestIdentity {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub der: Vec<u8>,
}

pub fn write_identity(dir: &Path, host: &str) -> TestIdentity {
    let generated = rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    let cert_path = dir.join(format!("{host}.crt"));
    let key_path = dir.join(format!("{host}.key"));
    std::fs::write(&cert_path, generated.cert.pem()).unwrap();
    std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();
    TestIdentity {
        cert_path,
        key_path,
        der: generated.cert.der().to_vec(),
    }
}

/// Temporary storage and a default identity for a proxy under test.
pub struct Workspace {
    pub dir: tempfile::TempDir,
    pub certs_dir: PathBuf,
    pub data_dir: PathBuf,
    pub identity: TestIdentity,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let certs_dir = dir.path().join("certs");
        let data_dir = dir.path().join("data");
        std::fs::create_dir_all(&certs_dir).unwrap();
        std::fs::create_dir_all(&data_dir).unwrap();
        let identity = write_identity(dir.path(), "default.example.test");
        Self {
            dir,
            certs_dir,
            data_dir,
            identity,
        }
    }

    /// Full configuration: workspace sections followed by `hosts_toml`.
    pub fn config(&self, hosts_toml: &str) -> ProxyConfig {
        let text = format!(
            r#"
            [listener]
            http_address = "127.0.0.1:0"
            https_address = "127.0.0.1:0"
            echo_ports = []

            [tls]
            cert_path = "{}"
            key_path = "{}"

            [upstream]
            accept_invalid_certs = false
            timeout_secs = 5

            [storage]
            certs_dir = "{}"
            data_dir = "{}"

            {}
            "#,
            self.identity.cert_path.display(),
            self.identity.key_path.display(),
            self.certs_dir.display(),
            self.data_dir.display(),
            hosts_toml
        );
        parse_config(&text).unwrap()
    }
}

/// Serve the plaintext front-end on an ephemeral port.
pub async fn start_http(server: Arc<ProxyServer>) -> (SocketAddr, Handle) {
    let handle = Handle::new();
    let serving = handle.clone();
    tokio::spawn(async move {
        server
            .serve_http("127.0.0.1:0".parse().unwrap(), serving)
            .await
            .unwrap();
    });
    let addr = handle.listening().await.unwrap();
    (addr, handle)
}

/// Serve the TLS front-end on an ephemeral port.
pub async fn start_https(server: Arc<ProxyServer>) -> (SocketAddr, Handle) {
    let handle = Handle::new();
    let serving = handle.clone();
    tokio::spawn(async move {
        server
            .serve_https("127.0.0.1:0".parse().unwrap(), serving)
            .await
            .unwrap();
    });
    let addr = handle.listening().await.unwrap();
    (addr, handle)
}

/// Wait until `path` exists and is non-empty, returning its contents.
pub async fn wait_for_file(path: &Path) -> Vec<u8> {
    for _ in 0..100 {
        if let Ok(contents) = tokio::fs::read(path).await {
            if !contents.is_empty() {
                return contents;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} was never written", path.display());
}
