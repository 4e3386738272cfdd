use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Json;
use axum::routing::{get, post};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::PredictError;
use crate::model::ClassifierModel;
use crate::postprocess::{Prediction, format_predictions};
use crate::preprocess::{PreprocessConfig, Processor};

/// Shared per-process state. The model slot starts empty and is filled at
/// most once by the loader task, so requests only ever observe "absent" or
/// "fully loaded" -- never a half-initialized model.
pub struct AppState {
    model: OnceLock<Arc<ClassifierModel>>,
    max_upload_bytes: usize,
}

impl AppState {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self {
            model: OnceLock::new(),
            max_upload_bytes,
        }
    }

    /// Publishes the loaded model. Later calls are ignored; there is no
    /// reload path.
    pub fn publish_model(&self, model: ClassifierModel) {
        let _ = self.model.set(Arc::new(model));
    }

    pub fn model(&self) -> Option<Arc<ClassifierModel>> {
        self.model.get().cloned()
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // The handler enforces the exact per-image limit itself; the framework
    // limit only has to sit above it to cover multipart framing.
    let body_limit = 2 * state.max_upload_bytes + 64 * 1024;
    Router::new()
        .route("/", get(health))
        .route("/api/predict", post(predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model: &'static str,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let model = if state.is_ready() { "Loaded" } else { "Loading" };
    Json(HealthResponse {
        status: "Alive",
        model,
    })
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    success: bool,
    #[serde(rename = "topPrediction")]
    top_prediction: Prediction,
    #[serde(rename = "allPredictions")]
    all_predictions: Vec<Prediction>,
}

async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, PredictError> {
    debug!("POST /api/predict");
    let upload = read_image_field(multipart, state.max_upload_bytes()).await?;
    let model = state.model().ok_or(PredictError::ServiceNotReady)?;

    let processor = Processor::new(PreprocessConfig::square(model.input_size()));
    let tensor = processor.normalize(&upload)?;
    debug!(bytes = upload.len(), "image decoded");

    let predictions = model.predict(tensor).await?;
    let result = format_predictions(predictions)?;
    info!(
        class = %result.top.class_name,
        probability = result.top.probability,
        "prediction done"
    );

    Ok(Json(PredictResponse {
        success: true,
        top_prediction: result.top,
        all_predictions: result.all,
    }))
}

/// Pulls the single `image` field out of the multipart form and checks it
/// against the configured size limit, before any decode work happens.
async fn read_image_field(
    mut multipart: Multipart,
    limit: usize,
) -> Result<Vec<u8>, PredictError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PredictError::Unexpected(anyhow::Error::new(e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| PredictError::Unexpected(anyhow::Error::new(e)))?;
        if data.is_empty() {
            return Err(PredictError::MissingImage);
        }
        if data.len() > limit {
            return Err(PredictError::PayloadTooLarge { limit });
        }
        return Ok(data.to_vec());
    }
    Err(PredictError::MissingImage)
}
