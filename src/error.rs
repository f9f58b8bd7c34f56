use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use tracing::error;

use crate::audit::AuditError;
use crate::engine::error::AttendanceError;
use crate::store::StoreError;

/// Errors rendered at the HTTP boundary as `{"message": ...}`.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Attendance(AttendanceError),

    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "not found")]
    NotFound,

    #[display(fmt = "{}", _0)]
    Conflict(String),

    /// Logged, never shown to the client
    #[display(fmt = "internal error: {}", _0)]
    Internal(String),
}

impl std::error::Error for ApiError {}

impl From<AttendanceError> for ApiError {
    fn from(e: AttendanceError) -> Self {
        ApiError::Attendance(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(message) => ApiError::Conflict(message),
            e => ApiError::Attendance(AttendanceError::Store(e)),
        }
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Attendance(e) => match e {
                AttendanceError::InvalidInput(_) | AttendanceError::FutureTimestamp { .. } => {
                    StatusCode::BAD_REQUEST
                }
                AttendanceError::SequenceViolation(_) => StatusCode::CONFLICT,
                AttendanceError::TenantMismatch => StatusCode::NOT_FOUND,
                AttendanceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            ApiError::Attendance(AttendanceError::SequenceViolation(v)) => json!({
                "message": v.to_string(),
                "reason": v.reason,
                "conflict": v.conflict,
            }),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %self, "Request failed");
                json!({ "message": "Something went wrong, Contact with system admin" })
            }
            _ => json!({ "message": self.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}
