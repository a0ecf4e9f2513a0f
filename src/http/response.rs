//! Response handling and transformation.
//!
//! Maps forwarding outcomes that did not produce an upstream response onto
//! client-facing status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::forwarding::ForwardOutcome;
use crate::http::request::BodyError;

/// Final client response for a forwarding outcome, plus the metrics label.
pub fn from_outcome(outcome: ForwardOutcome) -> (Response, &'static str) {
    match outcome {
        ForwardOutcome::Forwarded { response, .. } => (response.into_response(), "forwarded"),
        ForwardOutcome::NoHealthyTarget => (
            (StatusCode::SERVICE_UNAVAILABLE, "No healthy targets available").into_response(),
            "no_target",
        ),
        ForwardOutcome::Exhausted { .. } => (
            (StatusCode::SERVICE_UNAVAILABLE, "All upstream targets failed").into_response(),
            "exhausted",
        ),
        ForwardOutcome::Failed { .. } => (
            (StatusCode::BAD_GATEWAY, "Could not forward request").into_response(),
            "failed",
        ),
    }
}

/// Client response for a body that could not be buffered.
pub fn from_body_error(error: &BodyError) -> Response {
    match error {
        BodyError::TooLarge { .. } => {
            (StatusCode::PAYLOAD_TOO_LARGE, error.to_string()).into_response()
        }
        BodyError::Read(_) => (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
    }
}
