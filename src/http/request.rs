//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) for tracing
//! - Log the metadata of every inbound request
//! - Buffer the body under a size limit so it can be replayed

use axum::body::{Body, Bytes};
use axum::extract::ConnectInfo;
use axum::http::{HeaderValue, Request};
use http_body_util::LengthLimitError;
use std::net::SocketAddr;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Header carrying the correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Request ID set by the request-id layer, or `"unknown"`.
pub fn request_id<B>(request: &Request<B>) -> String {
    request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Peer address recorded by axum's connect-info service.
pub fn client_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Log receipt of a request.
///
/// A missing peer address is logged and skipped; it never aborts handling.
pub fn log_request<B>(request: &Request<B>, request_id: &str) {
    match client_addr(request) {
        Some(addr) => tracing::info!(
            request_id = %request_id,
            remote_ip = %addr.ip(),
            remote_port = addr.port(),
            method = %request.method(),
            path = %request.uri().path(),
            version = ?request.version(),
            "Received request"
        ),
        None => {
            tracing::warn!(request_id = %request_id, "Remote address unavailable for request");
            tracing::info!(
                request_id = %request_id,
                method = %request.method(),
                path = %request.uri().path(),
                version = ?request.version(),
                "Received request"
            );
        }
    }

    for (name, value) in request.headers() {
        match value.to_str() {
            Ok(v) => tracing::debug!(request_id = %request_id, header = %name, value = %v, "Request header"),
            Err(_) => tracing::debug!(request_id = %request_id, header = %name, "Request header (non-UTF-8 value)"),
        }
    }
}

/// Why an inbound body could not be buffered.
#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    Read(axum::Error),
}

/// Buffer the whole body, refusing anything larger than `limit`.
pub async fn read_body(body: Body, limit: usize) -> Result<Bytes, BodyError> {
    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let inner = e.into_inner();
        if inner.is::<LengthLimitError>() {
            BodyError::TooLarge { limit }
        } else {
            BodyError::Read(axum::Error::new(inner))
        }
    })
}
