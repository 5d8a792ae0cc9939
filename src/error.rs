use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::{ConstraintViolation, constraint_violation};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

/// Failures raised by the availability and booking rules.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ScheduleError {
    pub fn doctor_unavailable() -> Self {
        ScheduleError::Unavailable("doctor is not available at the requested date and time".into())
    }

    pub fn window_overlap() -> Self {
        ScheduleError::Conflict(
            "doctor already has an availability window overlapping this range".into(),
        )
    }

    pub fn appointment_exists() -> Self {
        ScheduleError::Conflict("appointment already exists".into())
    }

    /// Translate a database failure, treating constraint violations as the
    /// authoritative conflict signal.
    pub fn from_db(e: sqlx::Error, conflict: fn() -> ScheduleError) -> Self {
        match constraint_violation(&e) {
            Some(ConstraintViolation::Unique) | Some(ConstraintViolation::Exclusion) => conflict(),
            Some(ConstraintViolation::ForeignKey) => {
                ScheduleError::NotFound("referenced record not found".into())
            }
            None => {
                tracing::error!("db error: {e}");
                ScheduleError::Internal(format!("db error: {e}"))
            }
        }
    }
}

pub fn db_internal(e: sqlx::Error) -> ScheduleError {
    tracing::error!("db error: {e}");
    ScheduleError::Internal(format!("db error: {e}"))
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    Unavailable(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden("FORBIDDEN", msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(..) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(..) | ApiError::Unavailable(..) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(..) => StatusCode::NOT_FOUND,
            ApiError::Conflict(..) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn to_error_response(status: StatusCode, code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            success: false,
            status_code: status.as_u16(),
            message: message.to_string(),
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::InvalidInput(msg) => ApiError::BadRequest("VALIDATION_ERROR", msg),
            ScheduleError::Unavailable(msg) => ApiError::Unavailable("UNAVAILABLE", msg),
            ScheduleError::Conflict(msg) => ApiError::Conflict("CONFLICT", msg),
            ScheduleError::NotFound(msg) => ApiError::NotFound("NOT_FOUND", msg),
            ScheduleError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Unauthorized(code, msg)
            | ApiError::Forbidden(code, msg)
            | ApiError::BadRequest(code, msg)
            | ApiError::Unavailable(code, msg)
            | ApiError::NotFound(code, msg)
            | ApiError::Conflict(code, msg) => ApiError::to_error_response(status, code, msg),
            ApiError::Internal(msg) => ApiError::to_error_response(status, "INTERNAL", msg),
        };
        (status, body).into_response()
    }
}
