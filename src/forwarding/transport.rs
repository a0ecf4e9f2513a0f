//! Upstream transport.
//!
//! # Responsibilities
//! - Perform one network round trip to one target
//! - Rewrite the request URI onto the target
//! - Strip hop-by-hop headers in both directions
//! - Enforce the per-attempt timeout
//!
//! Any HTTP response, including 5xx, is a successful forward. Only
//! connection-level failures and timeouts are reported as errors.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, Uri};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::time;

use crate::load_balancer::Target;

/// Headers that only apply to a single connection hop.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// A fully buffered inbound request that can be replayed on every attempt.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl UpstreamRequest {
    pub fn new(method: Method, uri: &Uri, headers: HeaderMap, body: Bytes) -> Self {
        let path_and_query = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        Self {
            method,
            path_and_query,
            headers,
            body,
            client_addr: None,
        }
    }

    pub fn with_client_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.client_addr = addr;
        self
    }
}

/// Error from a single forwarding attempt.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to build upstream request: {0}")]
    Build(#[from] axum::http::Error),
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    /// Whether the error says something about the target's reachability.
    pub fn is_target_failure(&self) -> bool {
        matches!(self, ForwardError::Upstream(_) | ForwardError::Timeout(_))
    }
}

/// Performs the network round trip to a target.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn forward(
        &self,
        target: &Target,
        request: UpstreamRequest,
    ) -> Result<Response<Body>, ForwardError>;
}

/// Transport backed by the hyper-util pooled client.
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    timeout: Duration,
}

impl HyperTransport {
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self { client, timeout }
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn forward(
        &self,
        target: &Target,
        request: UpstreamRequest,
    ) -> Result<Response<Body>, ForwardError> {
        let uri = upstream_uri(target, &request.path_and_query);
        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        if let Some(addr) = request.client_addr {
            append_forwarded_for(&mut headers, addr);
        }

        let mut builder = Request::builder().method(request.method).uri(uri);
        if let Some(h) = builder.headers_mut() {
            *h = headers;
        }
        let upstream_request = builder.body(Body::from(request.body))?;

        match time::timeout(self.timeout, self.client.request(upstream_request)).await {
            Ok(Ok(response)) => {
                let (mut parts, body) = response.into_parts();
                strip_hop_by_hop(&mut parts.headers);
                Ok(Response::from_parts(parts, Body::new(body)))
            }
            Ok(Err(e)) => Err(ForwardError::Upstream(e)),
            Err(_) => Err(ForwardError::Timeout(self.timeout)),
        }
    }
}

/// `http://<authority><base path><path and query>` for the given target.
pub fn upstream_uri(target: &Target, path_and_query: &str) -> String {
    format!(
        "http://{}{}{}",
        target.authority(),
        target.base_path(),
        path_and_query
    )
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    // Upgrade is only meaningful alongside Connection: upgrade.
    headers.remove(header::UPGRADE);
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
