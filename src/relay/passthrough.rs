//! Passthrough relay.
//!
//! # Responsibilities
//! - Forward an inbound request (method, headers, body) to an upstream URL
//! - Map the upstream outcome onto the client response
//! - Run an optional success callback strictly after the client response
//!   has been handed off
//!
//! # Design Decisions
//! - The upstream body is buffered; it is small JSON in every known flow
//! - Headers that describe the framing of the inbound message are not
//!   forwarded; the client recomputes them
//! - A non-success upstream answer becomes a 400 carrying the upstream payload

use std::error::Error as StdError;
use std::future::Future;

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::stream;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::UpstreamConfig;
use crate::http::request::InboundRequest;
use crate::http::response;
use crate::observability::metrics;
use crate::relay::client::build_client;
use crate::relay::error::UpstreamError;
use crate::relay::is_relay_method;

/// Error type returned by a success callback.
pub type CallbackError = Box<dyn StdError + Send + Sync>;

/// Side effect invoked with the decoded upstream payload after a successful
/// relay.
pub type SuccessCallback =
    Box<dyn FnOnce(Value) -> BoxFuture<'static, Result<(), CallbackError>> + Send>;

/// Box an async closure as a [`SuccessCallback`].
pub fn on_success<F, Fut>(callback: F) -> SuccessCallback
where
    F: FnOnce(Value) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), CallbackError>> + Send + 'static,
{
    Box::new(move |payload| Box::pin(callback(payload)))
}

/// Inbound headers that are recomputed rather than copied upstream.
const RECOMPUTED_HEADERS: [HeaderName; 4] = [
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
    header::ACCEPT_ENCODING,
];

/// Headers forwarded to the upstream for `inbound`.
pub fn forwarded_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    for name in &RECOMPUTED_HEADERS {
        headers.remove(name);
    }
    headers
}

/// A successful upstream answer.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl UpstreamReply {
    /// Body parsed as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Payload handed to callbacks: the JSON body, or the body as a string.
    pub fn payload(&self) -> Value {
        self.json()
            .unwrap_or_else(|| Value::String(String::from_utf8_lossy(&self.body).into_owned()))
    }
}

/// Forwards requests to upstream origins.
#[derive(Debug, Clone)]
pub struct Relay {
    client: reqwest::Client,
}

impl Relay {
    pub fn new(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        Ok(Self::from_client(build_client(config)?))
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// The shared upstream client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Send `request` to `upstream_url` and buffer the answer.
    pub async fn forward(
        &self,
        upstream_url: &str,
        request: &InboundRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        let result = self.send(upstream_url, request).await;
        match &result {
            Ok(_) => metrics::record_upstream("success"),
            Err(e) => metrics::record_upstream(e.outcome()),
        }
        result
    }

    async fn send(
        &self,
        upstream_url: &str,
        request: &InboundRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        if !is_relay_method(&request.method) {
            return Err(UpstreamError::UnsupportedMethod(request.method.clone()));
        }

        let mut builder = self
            .client
            .request(request.method.clone(), upstream_url)
            .headers(forwarded_headers(&request.headers));
        if request.method == Method::POST {
            builder = builder.body(request.body.clone());
        }

        let upstream = builder.send().await?;
        let status = upstream.status();
        let content_type = upstream.headers().get(header::CONTENT_TYPE).cloned();
        let body = upstream.bytes().await?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status,
                content_type,
                body,
            });
        }

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }

    /// Relay `request` and build the client response.
    ///
    /// On success the client receives 200 with the upstream payload. When a
    /// callback is given it runs in the background once the response body
    /// has been fully handed to the connection (or dropped with it); its
    /// failure is logged and never reaches the client.
    pub async fn relay(
        &self,
        upstream_url: &str,
        request: &InboundRequest,
        on_success: Option<SuccessCallback>,
    ) -> Response {
        let reply = match self.forward(upstream_url, request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id(),
                    upstream = %upstream_url,
                    error = %e,
                    "Upstream request failed"
                );
                return response::upstream_failure(&e);
            }
        };

        tracing::debug!(
            request_id = %request.request_id(),
            upstream = %upstream_url,
            status = %reply.status,
            bytes = reply.body.len(),
            "Upstream replied"
        );

        let Some(callback) = on_success else {
            return response::upstream_success(&reply, Body::from(reply.body.clone()));
        };

        let (body, delivered) = body_with_delivery_signal(reply.body.clone());
        let payload = reply.payload();
        let request_id = request.request_id().to_string();
        tokio::spawn(async move {
            // Sender dropped (body consumed or connection gone) is the signal.
            let _ = delivered.await;
            if let Err(e) = callback(payload).await {
                tracing::warn!(request_id = %request_id, error = %e, "Relay callback failed");
            }
        });

        response::upstream_success(&reply, body)
    }
}

/// Fires the paired receiver when dropped.
struct DeliveryGuard(Option<oneshot::Sender<()>>);

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// A single-chunk body whose receiver resolves once the body has been read
/// to the end or discarded.
fn body_with_delivery_signal(bytes: Bytes) -> (Body, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    let guard = DeliveryGuard(Some(tx));

    let chunks = stream::unfold((Some(bytes), guard), |(next, guard)| async move {
        next.map(|chunk| (Ok::<_, std::io::Error>(chunk), (None, guard)))
    });
    (Body::from_stream(chunks), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_headers_are_not_forwarded() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        inbound.insert("x-custom", HeaderValue::from_static("1"));

        let forwarded = forwarded_headers(&inbound);
        assert_eq!(forwarded.len(), 2);
        assert_eq!(forwarded[header::AUTHORIZATION], "Bearer t");
        assert_eq!(forwarded["x-custom"], "1");
    }

    #[test]
    fn payload_falls_back_to_text() {
        let reply = UpstreamReply {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::from_static(b"plain"),
        };
        assert_eq!(reply.payload(), Value::String("plain".into()));

        let reply = UpstreamReply {
            body: Bytes::from_static(br#"{"a":1}"#),
            ..reply
        };
        assert_eq!(reply.payload(), serde_json::json!({"a": 1}));
    }

    #[tokio::test]
    async fn delivery_signal_fires_after_body_is_read() {
        let (body, mut delivered) = body_with_delivery_signal(Bytes::from_static(b"abc"));
        assert!(delivered.try_recv().is_err());

        let collected = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(&collected[..], b"abc");
        assert!(delivered.await.is_ok());
    }

    #[tokio::test]
    async fn delivery_signal_fires_when_body_is_dropped() {
        let (body, delivered) = body_with_delivery_signal(Bytes::from_static(b"abc"));
        drop(body);
        assert!(delivered.await.is_ok());
    }
}
