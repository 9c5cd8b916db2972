//! HTTP request and response types for the deployment API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Error;

/// Deployment request structure from POST /deploy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequest {
    /// Container image to deploy (required, validated by the dispatcher)
    #[serde(default)]
    pub image: Option<String>,
    /// Commit identifier (optional)
    #[serde(default)]
    pub commit: Option<String>,
}

/// Successful deployment response
#[derive(Debug, Serialize)]
pub struct DeployResponse {
    pub success: bool,
    pub message: String,
}

impl DeployResponse {
    pub fn triggered() -> Self {
        Self {
            success: true,
            message: "Deployment triggered".to_string(),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Standard error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Errors surfaced to HTTP clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    BadRequest {
        message: String,
        details: Option<String>,
    },
    DeploymentFailed {
        details: String,
    },
    NotFound,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::DeploymentFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        let (error, details) = match self {
            ApiError::Unauthorized => ("Unauthorized".to_string(), None),
            ApiError::Forbidden => ("Forbidden".to_string(), None),
            ApiError::BadRequest { message, details } => (message.clone(), details.clone()),
            ApiError::DeploymentFailed { details } => {
                ("Deployment failed".to_string(), Some(details.clone()))
            }
            ApiError::NotFound => ("Endpoint not found".to_string(), None),
        };
        ErrorResponse { error, details }
    }
}

/// Validation errors become 400s carrying their message; everything else is
/// a failed deployment
impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        match error {
            Error::Validation { message, .. } => ApiError::BadRequest {
                message,
                details: None,
            },
            Error::Execution(e) => ApiError::DeploymentFailed {
                details: e.details(),
            },
            other => ApiError::DeploymentFailed {
                details: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self.to_error_response())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExecutionError;

    #[test]
    fn test_deploy_request_optional_fields() {
        let request: DeployRequest = serde_json::from_str(r#"{"commit":"abc123"}"#).unwrap();
        assert_eq!(request.image, None);
        assert_eq!(request.commit.as_deref(), Some("abc123"));

        let request: DeployRequest =
            serde_json::from_str(r#"{"image":"myapp:1.2.3","extra":true}"#).unwrap();
        assert_eq!(request.image.as_deref(), Some("myapp:1.2.3"));
        assert_eq!(request.commit, None);
    }

    #[test]
    fn test_error_response_omits_missing_details() {
        let json = serde_json::to_value(ApiError::Unauthorized.to_error_response()).unwrap();
        assert_eq!(json, serde_json::json!({"error": "Unauthorized"}));

        let json = serde_json::to_value(
            ApiError::DeploymentFailed {
                details: "no such image".to_string(),
            }
            .to_error_response(),
        )
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"error": "Deployment failed", "details": "no such image"})
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::DeploymentFailed {
                details: String::new()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_from_error() {
        let error = Error::Validation {
            field: "image".to_string(),
            message: "Image parameter is required".to_string(),
        };
        assert_eq!(
            ApiError::from(error),
            ApiError::BadRequest {
                message: "Image parameter is required".to_string(),
                details: None
            }
        );

        let error = Error::Execution(ExecutionError::NonZeroExit {
            command: "/opt/deploy.sh".to_string(),
            code: 1,
            stderr: "boom\n".to_string(),
        });
        assert_eq!(
            ApiError::from(error),
            ApiError::DeploymentFailed {
                details: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_health_response_timestamp() {
        let health = HealthResponse::ok();
        assert_eq!(health.status, "ok");
        assert!(chrono::DateTime::parse_from_rfc3339(&health.timestamp).is_ok());
        assert!(health.timestamp.ends_with('Z'));
    }
}
