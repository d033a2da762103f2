//! HTTP mapping of [`CueError`]

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::task::JoinError;
use tracing::{error, warn};

use super::handlers::ApiResponse;
use crate::error::CueError;

/// Error returned by handlers, rendered as an error envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Status code reported for each error category
pub fn status_for(err: &CueError) -> StatusCode {
    match err {
        CueError::UnsupportedFileType(_) | CueError::Validation(_) | CueError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        CueError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CueError::Recognition(_) | CueError::Player(_) | CueError::Storage(_) => {
            StatusCode::BAD_GATEWAY
        }
        CueError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
        CueError::Export(_) | CueError::Media(_) | CueError::Io(_) | CueError::Yaml(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<CueError> for ApiError {
    fn from(err: CueError) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!(%status, error = %err, "request failed");
        } else {
            warn!(%status, error = %err, "request rejected");
        }
        Self::new(status, err.detail())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(error = %rejection.body_text(), "invalid JSON body");
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        warn!(error = %err, "invalid multipart body");
        Self::bad_request(format!("Invalid multipart request: {}", err))
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        error!(error = %err, "worker task failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Worker task failed")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ApiResponse::<()>::err(self.message))).into_response()
    }
}
