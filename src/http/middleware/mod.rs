//! HTTP middleware for the deployment webhook
//!
//! Bearer authentication guards the deploy route; the request span below
//! wraps every request for tracing.

pub mod auth;

use axum::extract::Request;
use tracing::{info_span, Span};

pub use auth::{bearer_auth_middleware, BearerGate};

/// Span for one HTTP request, used by the `TraceLayer`
pub fn make_request_span(request: &Request) -> Span {
    info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri(),
        version = ?request.version(),
        user_agent = request
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
        request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    )
}
