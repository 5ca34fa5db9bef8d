use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::{pipeline::PipelineError, providers::ProviderError, storage::StorageError, validation::ValidationError};

/// Errors returned by the evaluation server.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid JSON body: {0}")]
    Body(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(_) | ApiError::Body(_) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": self.to_string() }))).into_response()
            }
            ApiError::Pipeline(e) => {
                tracing::error!(error = %e, "Error faced during evaluation");
                // Raw message goes back unredacted.
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Failed to RUN", "details": e.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

/// Errors returned by the studio server. All bodies carry `success: false`.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("{0}")]
    BadRequest(String),
    /// Upstream answered with something other than success; relayed as-is.
    #[error("upstream returned {status}")]
    Upstream { status: StatusCode, body: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl IntoResponse for StudioError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            StudioError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            StudioError::Upstream { status, body } => {
                tracing::warn!(%status, "Upstream rejected request");
                (status, body)
            }
            other => {
                tracing::error!(error = %other, "Studio request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": error }))).into_response()
    }
}
