//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): dispatched requests by method, status, host
//! - `proxy_request_duration_seconds` (histogram): dispatch latency by method, host
//! - `proxy_route_misses_total` (counter): 404s by reason (`host`, `route`)
//! - `proxy_upstream_responses_total` (counter): relay outcomes
//! - `proxy_tls_handshakes_total` (counter): handshakes by outcome
//! - `proxy_artifact_downloads_total` (counter): background downloads by artifact, result
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Labels are bounded: unknown hosts are recorded as `none`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};

/// Buckets for request latency, in seconds.
const LATENCY_BUCKETS: &[f64] = &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the Prometheus recorder and serve it on `addr`.
///
/// Must be called from inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full("proxy_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install()?;

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// One dispatched request and how long it took.
pub fn record_request(method: &str, status: u16, host: &str, start: Instant) {
    metrics::counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "host" => host.to_string()
    )
    .increment(1);

    metrics::histogram!(
        "proxy_request_duration_seconds",
        "method" => method.to_string(),
        "host" => host.to_string()
    )
    .record(start.elapsed().as_secs_f64());
}

/// Why a request was answered with the fixed 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteMiss {
    Host,
    Route,
}

impl RouteMiss {
    fn as_str(self) -> &'static str {
        match self {
            RouteMiss::Host => "host",
            RouteMiss::Route => "route",
        }
    }
}

pub fn record_route_miss(reason: RouteMiss) {
    metrics::counter!("proxy_route_misses_total", "reason" => reason.as_str()).increment(1);
}

/// Outcome of one upstream call.
pub fn record_upstream(outcome: &'static str) {
    metrics::counter!("proxy_upstream_responses_total", "outcome" => outcome).increment(1);
}

/// Outcome of one TLS handshake: `accepted`, `rejected` (no secure context)
/// or `failed`.
pub fn record_handshake(outcome: &'static str) {
    metrics::counter!("proxy_tls_handshakes_total", "outcome" => outcome).increment(1);
}

pub fn record_artifact_download(artifact: &'static str, success: bool) {
    let result = if success { "success" } else { "failure" };
    metrics::counter!(
        "proxy_artifact_downloads_total",
        "artifact" => artifact,
        "result" => result
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            record_request("GET", 404, "none", Instant::now());
            record_route_miss(RouteMiss::Host);
            record_route_miss(RouteMiss::Host);
            record_upstream("timeout");
            record_handshake("rejected");
            record_artifact_download("ca.crt", false);
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"proxy_route_misses_total{reason="host"} 2"#));
        assert!(rendered.contains(r#"proxy_upstream_responses_total{outcome="timeout"} 1"#));
        assert!(rendered.contains(r#"proxy_tls_handshakes_total{outcome="rejected"} 1"#));
        assert!(rendered.contains(
            r#"proxy_artifact_downloads_total{artifact="ca.crt",result="failure"} 1"#
        ));
        assert!(rendered.contains("proxy_requests_total{"));
        assert!(rendered.contains(r#"status="404""#));
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_upstream("success");
        record_handshake("accepted");
    }
}
