//! Error responses
//!
//! Maps [`ApiError`] onto an HTTP status and a small JSON body. Internal
//! failures get a generic message; their detail goes to the log only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

use crate::error::{ApiError, ErrorKind};
use crate::metrics;

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden | ErrorKind::Authz => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Timeout | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        };

        let mut body = json!({
            "error": self.code(),
            "message": message,
        });
        if let Some(token) = self.token() {
            body["token"] = json!(token);
        }

        (kind.status(), Json(body)).into_response()
    }
}

/// Log and count a guard rejection, then hand the error back
///
/// Internal failures raised while a guard runs (an unreadable root, a failed
/// worker) are not rejections and go through [`failed`] instead.
pub fn rejected(guard: &'static str, err: impl Into<ApiError>) -> ApiError {
    let err = err.into();
    if err.kind() == ErrorKind::Internal {
        return failed(guard, err);
    }
    // `?token` renders through Debug, which escapes control characters
    warn!(guard, code = err.code(), token = ?err.token(), "Request rejected");
    metrics::record_rejection(guard, err.code());
    err
}

/// Log a collaborator failure after a guard approved the request
pub fn failed(operation: &'static str, err: impl Into<ApiError>) -> ApiError {
    let err = err.into();
    error!(operation, code = err.code(), error = %err, "Privileged operation failed");
    err
}
