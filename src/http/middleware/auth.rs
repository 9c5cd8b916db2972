//! Bearer token authentication for the deploy endpoint
//!
//! The `Authorization` header must carry `Bearer <token>`. A missing or
//! malformed header is answered with 401, a well-formed header with the wrong
//! token with 403. Either way the request never reaches the dispatcher.

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    config::AuthConfig, http::handlers::AppState, http::responses::ApiError,
    secrets::SecretToken, types::Result,
};

const BEARER_PREFIX: &str = "Bearer ";

/// Why a request was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No usable `Authorization: Bearer` header
    Unauthorized,
    /// Header present but the token does not match
    Forbidden,
}

impl AuthFailure {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthFailure::Unauthorized => "unauthorized",
            AuthFailure::Forbidden => "forbidden",
        }
    }
}

impl From<AuthFailure> for ApiError {
    fn from(failure: AuthFailure) -> Self {
        match failure {
            AuthFailure::Unauthorized => ApiError::Unauthorized,
            AuthFailure::Forbidden => ApiError::Forbidden,
        }
    }
}

/// Checks presented bearer tokens against the configured secret
pub struct BearerGate {
    token: SecretToken,
}

impl BearerGate {
    pub fn new(token: SecretToken) -> Self {
        Self { token }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Ok(Self::new(config.require_token()?.clone()))
    }

    pub fn authorize(&self, headers: &HeaderMap) -> std::result::Result<(), AuthFailure> {
        let presented = extract_bearer_token(headers).ok_or(AuthFailure::Unauthorized)?;

        if self.token.matches(presented) {
            Ok(())
        } else {
            Err(AuthFailure::Forbidden)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
///
/// Only the first space-separated segment after the prefix is the token, so
/// `Bearer` followed by nothing yields an empty token rather than `None`.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let rest = value.strip_prefix(BEARER_PREFIX)?;
    Some(rest.split(' ').next().unwrap_or(""))
}

/// Axum middleware guarding the deploy route
pub async fn bearer_auth_middleware(
    State(app_state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match app_state.gate.authorize(request.headers()) {
        Ok(()) => {
            debug!("Bearer token accepted");
            next.run(request).await
        }
        Err(failure) => {
            warn!(
                reason = failure.reason(),
                uri = %request.uri(),
                "Rejected deploy request"
            );
            crate::metrics::record_auth_rejection(failure.reason());
            ApiError::from(failure).into_response()
        }
    }
}
