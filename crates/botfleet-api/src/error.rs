//! HTTP mapping of supervisor errors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use botfleet_supervisor::SupervisorError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Instance {0} not found")]
    UnknownId(String),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnknownId(_) | Self::Supervisor(SupervisorError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Self::Supervisor(SupervisorError::NotRunning(_)) => StatusCode::BAD_REQUEST,
            Self::Supervisor(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
