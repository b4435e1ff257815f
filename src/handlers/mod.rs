pub mod bootstrap;
pub mod cache;
pub mod params;
pub mod templates;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::assembler::BootstrapError;
use crate::packager::PackageError;

/// Error response body: {"error": "message"}
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{} not found", resource),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse::new(self.message)),
        )
            .into_response()
    }
}

impl From<BootstrapError> for ApiError {
    fn from(err: BootstrapError) -> Self {
        match &err {
            BootstrapError::RequiredParameters(_) => Self::bad_request(err.to_string()),
            BootstrapError::Package(PackageError::MissingCredentials(_)) => {
                Self::bad_request(err.to_string())
            }
            BootstrapError::TemplateNotFound(_)
            | BootstrapError::InvalidConfiguration(_)
            | BootstrapError::Package(_) => {
                tracing::error!("{}", err);
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<PackageError> for ApiError {
    fn from(err: PackageError) -> Self {
        BootstrapError::from(err).into()
    }
}

/// Outcome of a catalog mutation: {"success", "message", "status_code"}
#[derive(Serialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub status_code: u16,
}

impl StatusResponse {
    /// 200 on success, 500 otherwise
    pub fn from_outcome(ok: bool, success_msg: &str, failure_msg: &str) -> Response {
        let (status, message) = if ok {
            (StatusCode::OK, success_msg)
        } else {
            (StatusCode::INTERNAL_SERVER_ERROR, failure_msg)
        };
        (
            status,
            Json(Self {
                success: ok,
                message: message.to_string(),
                status_code: status.as_u16(),
            }),
        )
            .into_response()
    }
}

/// Healthcheck endpoint: returns 200 OK with status
pub async fn healthcheck() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "bootstrapper",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (BootstrapError::RequiredParameters("hostname".into()), StatusCode::BAD_REQUEST),
            (BootstrapError::TemplateNotFound("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                BootstrapError::Package(PackageError::MissingCredentials("aws_key".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                BootstrapError::Package(PackageError::Archive("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
