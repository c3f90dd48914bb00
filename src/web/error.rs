use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;
use tracing::error;

use crate::services::trial::AccessDenial;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Paid action denied: {0}")]
    PaidAccessDenied(AccessDenial),
    #[error("Plan limit reached: {0}")]
    PlanLimitReached(String),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Too many requests: {message}")]
    TooManyRequests { message: String, retry_after_secs: u64 },
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::AlreadyExists(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::PaidAccessDenied(_) | AppError::PlanLimitReached(_) => {
                StatusCode::FORBIDDEN
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "INVALID_INPUT",
            AppError::AlreadyExists(_) => "ALREADY_EXISTS",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::PaidAccessDenied(denial) => denial.code(),
            AppError::PlanLimitReached(_) => "PLAN_LIMIT_REACHED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::TooManyRequests { .. } => "RATE_LIMITED",
            AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let retry_after = match &self {
            AppError::TooManyRequests { retry_after_secs, .. } => Some(*retry_after_secs),
            _ => None,
        };

        let error_message = match self {
            AppError::InvalidInput(msg)
            | AppError::AlreadyExists(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::PlanLimitReached(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg) => msg,
            AppError::InvalidCredentials => "Invalid credentials".to_string(),
            AppError::PaidAccessDenied(denial) => denial.to_string(),
            AppError::TooManyRequests { message, .. } => message,
            AppError::PasswordHashingError(msg)
            | AppError::TokenCreationError(msg)
            | AppError::DatabaseError(msg)
            | AppError::InternalServerError(msg) => {
                // Details stay in the log, not in the response.
                error!(error = %msg, "Request failed with an internal error.");
                "Internal server error".to_string()
            }
        };

        let mut response =
            (status, Json(serde_json::json!({ "error": error_message, "code": code }))).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(_)) = err.sql_err() {
            return AppError::Conflict("A record with the same unique value already exists.".to_string());
        }
        match err {
            DbErr::RecordNotFound(what) => AppError::NotFound(what),
            other => AppError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}

impl From<AccessDenial> for AppError {
    fn from(denial: AccessDenial) -> Self {
        AppError::PaidAccessDenied(denial)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(AppError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::PaidAccessDenied(AccessDenial::TrialExpired).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::PaidAccessDenied(AccessDenial::TrialExpired).code(),
            "TRIAL_EXPIRED"
        );
        assert_eq!(AppError::NotFound("bot 1".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("dup".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::TooManyRequests { message: "slow down".into(), retry_after_secs: 3 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AppError::DatabaseError("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn record_not_found_maps_to_404() {
        let err: AppError = DbErr::RecordNotFound("bots 7".to_string()).into();
        assert!(matches!(err, AppError::NotFound(ref what) if what == "bots 7"));
    }

    #[test]
    fn rate_limit_sets_retry_after() {
        let response = AppError::TooManyRequests {
            message: "locked".to_string(),
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "42");
    }
}
