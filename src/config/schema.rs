//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the intercepting proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (plaintext, TLS and echo ports).
    pub listener: ListenerConfig,

    /// Default TLS identity shared by every virtual host without its own pair.
    pub tls: TlsConfig,

    /// Upstream transport settings used by the relay and the artifact cache.
    pub upstream: UpstreamConfig,

    /// Local directories for persisted artifacts and records.
    pub storage: StorageConfig,

    /// Values substituted into intercepted device documents.
    pub interception: InterceptionConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Virtual hosts served on the shared listeners.
    pub hosts: Vec<HostConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext HTTP bind address.
    pub http_address: String,

    /// TLS-terminated HTTP bind address.
    pub https_address: String,

    /// Raw byte-echo ports. Empty disables the echo listeners.
    pub echo_ports: Vec<u16>,

    /// Bind address used for the echo ports.
    pub echo_bind_ip: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:80".to_string(),
            https_address: "0.0.0.0:443".to_string(),
            echo_ports: vec![6667, 8080, 51000, 53000],
            echo_bind_ip: "0.0.0.0".to_string(),
        }
    }
}

/// A certificate/key pair on disk.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "./certs/fakehubble.crt".to_string(),
            key_path: "./certs/fakehubble.key".to_string(),
        }
    }
}

/// Upstream transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Skip upstream certificate validation. On by default: the proxy
    /// intercepts traffic for hosts whose certificates it cannot verify.
    pub accept_invalid_certs: bool,

    /// Total time allowed for one upstream exchange, in seconds.
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            accept_invalid_certs: true,
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Downloaded certificates and keys; also exposed under `/certs`.
    pub certs_dir: String,

    /// Session records and derived device files.
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            certs_dir: "./certs".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

/// Values written into owned-device documents before they reach the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterceptionConfig {
    /// Replaces `device_location.local_ip` and `device_location.remote_ip`.
    pub device_ip: String,

    /// Replaces `device_location.local_port_1`.
    pub device_port: String,

    /// Replaces `mac_address`.
    pub mac_address: String,

    /// Port used in generated RTSP shortcut URLs.
    pub rtsp_port: u16,

    /// Stream path used in generated RTSP shortcut URLs.
    pub rtsp_path: String,
}

impl Default for InterceptionConfig {
    fn default() -> Self {
        Self {
            device_ip: "192.168.100.210".to_string(),
            device_port: "6667".to_string(),
            mac_address: "281878FFDB54".to_string(),
            rtsp_port: 6667,
            rtsp_path: "blinkhd".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Scrape endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum inbound body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// A virtual host: one hostname, one identity, one route table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostConfig {
    /// Hostname matched against SNI and the Host header (exact match).
    pub hostname: String,

    /// Base URL of the real service. Defaults to `https://<hostname>`.
    #[serde(default)]
    pub upstream_base: Option<String>,

    /// Host-specific identity; falls back to the top-level `[tls]` pair.
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    /// Routes in match order.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

impl HostConfig {
    /// Upstream base URL without a trailing slash.
    pub fn upstream_base(&self) -> String {
        match &self.upstream_base {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!("https://{}", self.hostname),
        }
    }
}

/// A single route of a virtual host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// HTTP method (GET, POST, DELETE, ...).
    pub method: String,

    /// Path pattern; `:name` segments are captured.
    pub path: String,

    /// What the route does with a matched request.
    pub kind: RouteKind,

    /// Upstream path template for relaying routes; defaults to the inbound path.
    #[serde(default)]
    pub upstream_path: Option<String>,

    /// Response body for `static_json` routes.
    #[serde(default)]
    pub body: Option<serde_json::Value>,
}

/// Route behaviours.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Relay verbatim to the upstream.
    Passthrough,
    /// Relay the login and persist the issued session.
    AuthenticationToken,
    /// Answer from the persisted session for `api_key`.
    Me,
    /// Relay and download the per-device certificates.
    DeviceConfig,
    /// Relay and download the MQTT certificates.
    UserCertificates,
    /// Relay and persist one record per registered device model.
    DeviceModels,
    /// Relay, persist and rewrite the owned-device list.
    OwnDevices,
    /// Answer with a fixed JSON body.
    StaticJson,
}

impl RouteKind {
    /// Whether the route contacts the upstream.
    pub fn relays(self) -> bool {
        !matches!(self, RouteKind::Me | RouteKind::StaticJson)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.https_address, "0.0.0.0:443");
        assert_eq!(config.listener.echo_ports, vec![6667, 8080, 51000, 53000]);
        assert!(config.upstream.accept_invalid_certs);
        assert_eq!(config.upstream.timeout_secs, 30);
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn parses_hosts_and_routes() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [[hosts]]
            hostname = "api.example.test"

            [[hosts.routes]]
            method = "GET"
            path = "/v1/devices/:id/attribute"
            kind = "passthrough"

            [[hosts.routes]]
            method = "GET"
            path = "/v1/baby_tracker/profile"
            kind = "static_json"
            body = []
            "#,
        )
        .unwrap();

        let host = &config.hosts[0];
        assert_eq!(host.upstream_base(), "https://api.example.test");
        assert_eq!(host.routes.len(), 2);
        assert_eq!(host.routes[0].kind, RouteKind::Passthrough);
        assert_eq!(host.routes[1].body, Some(serde_json::json!([])));
    }

    #[test]
    fn upstream_base_trims_trailing_slash() {
        let host = HostConfig {
            hostname: "api.example.test".into(),
            upstream_base: Some("http://127.0.0.1:9000/".into()),
            tls: None,
            routes: Vec::new(),
        };
        assert_eq!(host.upstream_base(), "http://127.0.0.1:9000");
    }
}
