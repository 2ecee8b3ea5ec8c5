//! Single error type for every handler, rendered as the JSON envelope
//! `{ "success": false, "message": ... }`.
use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Upload, mail delivery or push failed.
    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        AppError::Upstream(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::Upstream(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Internal causes stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// Body rejections become 400, or 415 when the content type is wrong.
fn from_rejection(status: StatusCode, text: String) -> AppError {
    if status == StatusCode::UNSUPPORTED_MEDIA_TYPE {
        AppError::UnsupportedMediaType(text)
    } else {
        AppError::Validation(text)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        from_rejection(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Internal(ref e) = self {
            error!(error = ?e, "internal error");
        }
        let body = Json(json!({
            "success": false,
            "message": self.public_message(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_category() {
        assert_eq!(
            AppError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("no").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::upstream("smtp down").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn content_type_rejection_keeps_415() {
        assert_eq!(
            from_rejection(StatusCode::UNSUPPORTED_MEDIA_TYPE, "json only".into()).status_code(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        let err = from_rejection(StatusCode::UNPROCESSABLE_ENTITY, "missing field".into());
        assert!(matches!(err, AppError::Validation(ref m) if m == "missing field"));
    }

    #[test]
    fn internal_message_is_sanitized() {
        let err = AppError::from(anyhow::anyhow!("connection refused on 10.0.0.3"));
        assert_eq!(err.public_message(), "Internal server error");

        let err = AppError::validation("Invalid OTP");
        assert_eq!(err.public_message(), "Invalid OTP");
    }

    #[tokio::test]
    async fn into_response_renders_envelope() {
        let response = AppError::not_found("User not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "User not found");
    }
}
