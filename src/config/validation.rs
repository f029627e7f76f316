//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Hostnames unique across virtual hosts
//! - Methods and path patterns parse; relaying routes use a relay method
//! - Listener and metrics addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use axum::http::Method;
use thiserror::Error;

use crate::config::schema::{ProxyConfig, RouteKind};
use crate::relay::is_relay_method;
use crate::routing::matcher::PathPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field} address '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("hostname must not be empty")]
    EmptyHostname,

    #[error("duplicate virtual host '{0}'")]
    DuplicateHost(String),

    #[error("{host}: invalid method '{method}'")]
    InvalidMethod { host: String, method: String },

    #[error("{host}: invalid path pattern '{path}'")]
    InvalidPath { host: String, path: String },

    #[error("{host}: method {method} cannot be relayed ({path})")]
    UnsupportedRelayMethod { host: String, method: String, path: String },

    #[error("{host}: static_json route {path} has no body")]
    MissingStaticBody { host: String, path: String },

    #[error("{host}: invalid upstream base '{value}'")]
    InvalidUpstream { host: String, value: String },

    #[error("upstream timeouts must be greater than zero")]
    ZeroTimeout,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("http", &config.listener.http_address),
        ("https", &config.listener.https_address),
    ] {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.clone(),
            });
        }
    }
    if !config.listener.echo_ports.is_empty()
        && config.listener.echo_bind_ip.parse::<IpAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "echo",
            value: config.listener.echo_bind_ip.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "metrics",
            value: config.observability.metrics_address.clone(),
        });
    }

    if config.upstream.timeout_secs == 0 || config.upstream.connect_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let mut seen = HashSet::new();
    for host in &config.hosts {
        let name = host.hostname.trim().to_lowercase();
        if name.is_empty() {
            errors.push(ValidationError::EmptyHostname);
            continue;
        }
        if !seen.insert(name.clone()) {
            errors.push(ValidationError::DuplicateHost(name.clone()));
        }

        let base = host.upstream_base();
        if url::Url::parse(&base).is_err() {
            errors.push(ValidationError::InvalidUpstream {
                host: name.clone(),
                value: base,
            });
        }

        for route in &host.routes {
            let method = match route.method.to_uppercase().parse::<Method>() {
                Ok(m) => m,
                Err(_) => {
                    errors.push(ValidationError::InvalidMethod {
                        host: name.clone(),
                        method: route.method.clone(),
                    });
                    continue;
                }
            };

            let patterns = std::iter::once(&route.path).chain(route.upstream_path.as_ref());
            for path in patterns {
                if PathPattern::parse(path).is_err() {
                    errors.push(ValidationError::InvalidPath {
                        host: name.clone(),
                        path: path.clone(),
                    });
                }
            }

            if route.kind.relays() && !is_relay_method(&method) {
                errors.push(ValidationError::UnsupportedRelayMethod {
                    host: name.clone(),
                    method: method.to_string(),
                    path: route.path.clone(),
                });
            }

            if route.kind == RouteKind::StaticJson && route.body.is_none() {
                errors.push(ValidationError::MissingStaticBody {
                    host: name.clone(),
                    path: route.path.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{HostConfig, RouteConfig};

    fn route(method: &str, path: &str, kind: RouteKind) -> RouteConfig {
        RouteConfig {
            method: method.into(),
            path: path.into(),
            kind,
            upstream_path: None,
            body: None,
        }
    }

    fn host(name: &str, routes: Vec<RouteConfig>) -> HostConfig {
        HostConfig {
            hostname: name.into(),
            upstream_base: None,
            tls: None,
            routes,
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn reports_duplicate_hosts_case_insensitively() {
        let mut config = ProxyConfig::default();
        config.hosts.push(host("api.example.test", vec![]));
        config.hosts.push(host("API.example.test", vec![]));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateHost("api.example.test".into())]
        );
    }

    #[test]
    fn collects_all_route_errors() {
        let mut config = ProxyConfig::default();
        config.hosts.push(host(
            "api.example.test",
            vec![
                route("GE T", "/a", RouteKind::Passthrough),
                route("PUT", "/b", RouteKind::Passthrough),
                route("GET", "no-slash", RouteKind::Passthrough),
                route("GET", "/c", RouteKind::StaticJson),
                route("PUT", "/d", RouteKind::StaticJson),
            ],
        ));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(matches!(errors[0], ValidationError::InvalidMethod { .. }));
        assert!(matches!(errors[1], ValidationError::UnsupportedRelayMethod { .. }));
        assert!(matches!(errors[2], ValidationError::InvalidPath { .. }));
        assert!(matches!(errors[3], ValidationError::MissingStaticBody { .. }));
        // PUT is fine for a route that never reaches the upstream.
        assert!(matches!(errors[4], ValidationError::MissingStaticBody { .. }));
    }

    #[test]
    fn rejects_bad_listener_address() {
        let mut config = ProxyConfig::default();
        config.listener.https_address = "localhost".into();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidAddress { field: "https", .. }
        ));
    }

    #[test]
    fn metrics_address_is_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "nowhere".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidAddress {
                field: "metrics",
                value: "nowhere".into()
            }]
        );

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
