use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Rate limited")]
    RateLimited { retry_after_ms: u64 },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::RateLimited { retry_after_ms } => Self::RateLimited { retry_after_ms },
            AppError::Database(_) | AppError::OpenAI(_) => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::RateLimited { retry_after_ms } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(RateLimitResponse {
                    error: "Rate limit exceeded".to_string(),
                    status: "error".to_string(),
                    retry_after_ms,
                }),
            )
                .into_response(),
            Self::InternalError(message) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            Self::ValidationError(message) => error_response(StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => error_response(StatusCode::NOT_FOUND, message),
            Self::Unauthorized(message) => error_response(StatusCode::UNAUTHORIZED, message),
            Self::PayloadTooLarge(message) => {
                error_response(StatusCode::PAYLOAD_TOO_LARGE, message)
            }
            Self::ServiceUnavailable(message) => {
                error_response(StatusCode::SERVICE_UNAVAILABLE, message)
            }
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message,
            status: "error".to_string(),
        }),
    )
        .into_response()
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[derive(Serialize, Debug)]
struct RateLimitResponse {
    error: String,
    status: String,
    retry_after_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(error: ApiError) -> StatusCode {
        error.into_response().status()
    }

    #[test]
    fn app_error_conversion_preserves_classification() {
        let not_found = ApiError::from(AppError::NotFound("resource".into()));
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let validation = ApiError::from(AppError::Validation("bad input".into()));
        assert!(matches!(validation, ApiError::ValidationError(_)));

        let auth = ApiError::from(AppError::Auth("nope".into()));
        assert!(matches!(auth, ApiError::Unauthorized(_)));

        let limited = ApiError::from(AppError::RateLimited {
            retry_after_ms: 1200,
        });
        assert!(matches!(
            limited,
            ApiError::RateLimited {
                retry_after_ms: 1200
            }
        ));
    }

    #[test]
    fn internal_errors_are_sanitized() {
        let err = ApiError::from(AppError::InternalError("db password leaked".into()));
        match err {
            ApiError::InternalError(_) => {}
            other => panic!("expected internal error, got {other:?}"),
        }
        assert_eq!(
            ApiError::InternalError("whatever".into()).to_string(),
            "Internal server error"
        );
    }

    #[test]
    fn status_codes_match_error_kinds() {
        assert_eq!(
            status_of(ApiError::InternalError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ApiError::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ApiError::NotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::Unauthorized("x".into())),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(ApiError::RateLimited {
                retry_after_ms: 100
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(ApiError::ServiceUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
