pub mod cli;
pub mod error;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod service;

pub use crate::cli::Args;
pub use crate::error::PredictError;
pub use crate::model::{ClassifierModel, ModelMetadata, ModelSource, OnnxModel};
pub use crate::postprocess::{Prediction, PredictionResult, format_predictions};
pub use crate::preprocess::{PreprocessConfig, Processor};
pub use crate::service::{AppState, router};
