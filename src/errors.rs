use crate::{
    auth::AuthError,
    services::{thumbnail_service::ThumbnailError, upload_pipeline::UploadError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        tracing::debug!(error = %err, "rejecting request credentials");
        match err {
            AuthError::MissingBearer | AuthError::MalformedHeader => {
                AppError::unauthorized("Couldn't find JWT")
            }
            AuthError::InvalidToken(_) | AuthError::InvalidSubject(_) => {
                AppError::unauthorized("Couldn't validate JWT")
            }
            AuthError::Encode(_) => AppError::internal("Internal server error"),
        }
    }
}

impl From<UploadError> for AppError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::NotFound(_) => AppError::not_found("Couldn't find video"),
            UploadError::NotOwner => AppError::unauthorized("You don't own this video"),
            UploadError::MissingContentType | UploadError::UnsupportedContentType(_) => {
                AppError::bad_request(err.to_string())
            }
            UploadError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            internal => {
                tracing::error!(error = %internal, "video upload failed");
                AppError::internal(internal.public_message())
            }
        }
    }
}

impl From<ThumbnailError> for AppError {
    fn from(err: ThumbnailError) -> Self {
        match err {
            ThumbnailError::NotFound(_) => AppError::not_found("Couldn't find video"),
            ThumbnailError::NotOwner => AppError::unauthorized("Not authorized to update this video"),
            ThumbnailError::MissingContentType | ThumbnailError::UnsupportedContentType(_) => {
                AppError::bad_request(err.to_string())
            }
            ThumbnailError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            internal => {
                tracing::error!(error = %internal, "thumbnail upload failed");
                AppError::internal("Couldn't store thumbnail")
            }
        }
    }
}
