//! HTTP endpoint handlers for the deployment API

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::warn;

use crate::{
    dispatch::{DeployJob, DeployOutcome, Dispatcher},
    http::{middleware::BearerGate, responses::*},
};

/// Application state shared across handlers
pub struct AppState {
    pub gate: Arc<BearerGate>,
    pub dispatcher: Arc<Dispatcher>,
}

/// POST /deploy - Run the deployment script for the requested image
pub async fn handle_deploy(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DeployResponse>, ApiError> {
    let request = parse_deploy_request(&headers, &body)?;

    let job = DeployJob::new(request.image, request.commit).map_err(|e| {
        warn!(error = %e, "Rejected deploy request");
        ApiError::from(e)
    })?;

    match state.dispatcher.dispatch(job).await? {
        DeployOutcome::Succeeded { .. } => Ok(Json(DeployResponse::triggered())),
        DeployOutcome::Failed { details } => Err(ApiError::DeploymentFailed { details }),
    }
}

/// Decode the deploy body.
///
/// Only a JSON content type with a non-blank body is parsed. Anything else
/// is an empty request, so a missing image is reported as such.
fn parse_deploy_request(headers: &HeaderMap, body: &[u8]) -> Result<DeployRequest, ApiError> {
    if !has_json_content_type(headers) || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(DeployRequest::default());
    }

    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "Invalid JSON in deploy request");
        ApiError::BadRequest {
            message: "Invalid JSON body".to_string(),
            details: Some(e.to_string()),
        }
    })
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json"
        || (essence.starts_with("application/") && essence.ends_with("+json"))
}

/// GET /health - Liveness check
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// GET /metrics - Prometheus metrics endpoint
pub async fn handle_metrics() -> Result<impl IntoResponse, StatusCode> {
    match crate::metrics::gather_metrics() {
        Ok(metrics_text) => Ok((
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            metrics_text,
        )),
        Err(e) => {
            warn!(error = %e, "Failed to gather Prometheus metrics");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Fallback handler for 404 Not Found
pub async fn handle_not_found() -> ApiError {
    ApiError::NotFound
}
