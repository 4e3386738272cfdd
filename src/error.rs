use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

/// Everything that can go wrong between receiving an upload and returning a
/// ranked prediction list. Each stage of the pipeline fails with its own
/// variant so the HTTP layer can tell bad input from backend trouble.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("No image uploaded")]
    MissingImage,

    #[error("Image too large (limit {limit} bytes)")]
    PayloadTooLarge { limit: usize },

    #[error("Model not loaded yet")]
    ServiceNotReady,

    #[error("Invalid image format")]
    InvalidImageFormat(#[source] image::ImageError),

    #[error("Failed during prediction")]
    PredictionFailed(#[source] anyhow::Error),

    #[error("Model produced an empty prediction set")]
    EmptyPredictionSet,

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl PredictError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingImage | Self::PayloadTooLarge { .. } | Self::InvalidImageFormat(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::ServiceNotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::PredictionFailed(_) | Self::EmptyPredictionSet | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status.is_server_error() {
            error!(error = ?self, "request failed");
            json!({ "success": false, "error": self.to_string() })
        } else {
            debug!(error = %self, "request rejected");
            json!({ "error": self.to_string() })
        };
        (status, Json(body)).into_response()
    }
}
