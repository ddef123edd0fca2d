use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Access forbidden")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Casbin error: {0}")]
    Casbin(#[from] casbin::Error),
}

impl AppError {
    /// Machine-readable error id carried in every error body
    pub fn id(&self) -> &'static str {
        match self {
            AppError::InvalidToken => "invalid_token",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            _ => "internal_server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    id: &'static str,
    code: u16,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (message, details) = match &self {
            AppError::InvalidToken => ("Unauthorized", None),
            AppError::Forbidden => ("Forbidden", None),
            AppError::NotFound(msg) => ("Not Found", Some(msg.clone())),
            AppError::BadRequest(msg) => ("Bad Request", Some(msg.clone())),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal Server Error", None)
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {}", err);
                ("Database Error", None)
            }
            AppError::Io(err) => {
                tracing::error!("IO error: {}", err);
                ("IO Error", None)
            }
            AppError::Json(err) => {
                tracing::error!("JSON error: {}", err);
                ("Internal Server Error", None)
            }
            AppError::Casbin(err) => {
                tracing::error!("Casbin error: {}", err);
                ("Internal Server Error", None)
            }
        };

        let status = self.status();
        let body = ErrorResponse {
            id: self.id(),
            code: status.as_u16(),
            message: message.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for application
pub type AppResult<T> = Result<T, AppError>;

/// Helper trait for converting Option to AppError::NotFound
pub trait OptionExt<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, msg: impl Into<String>) -> AppResult<T> {
        self.ok_or_else(|| AppError::NotFound(msg.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let err = AppError::NotFound("Menu not found".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_auth_errors_map_to_401_and_403() {
        assert_eq!(AppError::InvalidToken.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_error_ids() {
        assert_eq!(AppError::InvalidToken.id(), "invalid_token");
        assert_eq!(AppError::BadRequest("x".into()).id(), "bad_request");
        assert_eq!(AppError::Internal("x".into()).id(), "internal_server_error");
        assert_eq!(
            AppError::Database(sea_orm::DbErr::Custom("boom".into())).id(),
            "internal_server_error"
        );
    }

    #[test]
    fn test_option_ext() {
        let opt: Option<i32> = None;
        let result = opt.ok_or_not_found("Item not found");
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
