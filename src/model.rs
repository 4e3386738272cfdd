use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use ndarray::{Array4, CowArray};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::PredictError;
use crate::postprocess::Prediction;

const MODEL_FILE: &str = "model.onnx";
const METADATA_FILE: &str = "metadata.json";

/// Where the classifier artifacts live and how the session should be built.
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub base_url: String,
    pub cuda: bool,
}

/// The slice of metadata.json the pipeline needs: the ordered label set and
/// the square input size the model was exported with.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelMetadata {
    pub labels: Vec<String>,
    #[serde(rename = "imageSize", default = "default_image_size")]
    pub image_size: u32,
}

fn default_image_size() -> u32 {
    224
}

pub struct OnnxModel {
    provider: [ort::execution_providers::ExecutionProviderDispatch; 1],
}

impl OnnxModel {
    pub fn new(cuda: bool) -> Self {
        let provider = if cuda {
            [CUDAExecutionProvider::default().build().error_on_failure()]
        } else {
            [CPUExecutionProvider::default().build()]
        };
        Self { provider }
    }

    pub fn load_session(&self, model_path: &Path) -> Result<Session> {
        let session = SessionBuilder::new()?
            .with_execution_providers(self.provider.clone())?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .commit_from_file(model_path)?;
        Ok(session)
    }
}

/// A loaded classifier: ort session plus label metadata. Read-only after
/// construction. The session sits behind a mutex because ort sessions are not
/// assumed safe for concurrent invocation, so inference is single in-flight.
pub struct ClassifierModel {
    session: Mutex<Session>,
    metadata: ModelMetadata,
}

impl ClassifierModel {
    /// Downloads the model artifacts and builds the inference session.
    /// Blocking; run it on a blocking task.
    pub fn load(source: &ModelSource) -> Result<Self> {
        let metadata = fetch_metadata(&source.base_url)?;
        let model_path = fetch_model(&source.base_url)?;
        let session = OnnxModel::new(source.cuda).load_session(&model_path)?;
        info!(
            classes = metadata.labels.len(),
            input_size = metadata.image_size,
            "model loaded successfully"
        );
        Ok(Self {
            session: Mutex::new(session),
            metadata,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.metadata.labels
    }

    pub fn input_size(&self) -> u32 {
        self.metadata.image_size
    }

    /// Runs inference on a normalized tensor and pairs the scores with the
    /// label set. The tensor is moved in, so its buffer is reclaimed before
    /// this returns on success and on every error path alike.
    pub async fn predict(&self, tensor: Array4<f32>) -> Result<Vec<Prediction>, PredictError> {
        let xs = CowArray::from(tensor.into_dyn());
        let scores = {
            let session = self.session.lock().await;
            let input = ort::inputs![xs.view()]
                .map_err(|e| PredictError::PredictionFailed(e.into()))?;
            let outputs = session
                .run(input)
                .map_err(|e| PredictError::PredictionFailed(e.into()))?;
            let (_name, value) = outputs.iter().next().ok_or_else(|| {
                PredictError::PredictionFailed(anyhow::anyhow!("model produced no outputs"))
            })?;
            let view = value
                .try_extract_tensor::<f32>()
                .map_err(|e| PredictError::PredictionFailed(e.into()))?;
            view.iter().copied().collect::<Vec<f32>>()
        };
        drop(xs);

        if scores.len() != self.metadata.labels.len() {
            return Err(PredictError::PredictionFailed(anyhow::anyhow!(
                "model returned {} scores for {} labels",
                scores.len(),
                self.metadata.labels.len()
            )));
        }

        Ok(self
            .metadata
            .labels
            .iter()
            .zip(scores)
            .map(|(label, probability)| Prediction {
                class_name: label.clone(),
                probability,
            })
            .collect())
    }
}

fn artifact_url(base_url: &str, file: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), file)
}

fn fetch_metadata(base_url: &str) -> Result<ModelMetadata> {
    let url = artifact_url(base_url, METADATA_FILE);
    let metadata: ModelMetadata = ureq::get(&url)
        .call()
        .with_context(|| format!("fetching {url}"))?
        .into_json()
        .with_context(|| format!("parsing {METADATA_FILE}"))?;
    if metadata.labels.is_empty() {
        bail!("{METADATA_FILE} lists no class labels");
    }
    if metadata.image_size == 0 {
        bail!("{METADATA_FILE} declares a zero input size");
    }
    Ok(metadata)
}

/// Downloads the model weights into the user cache directory and returns the
/// local path. Any previous download is overwritten.
fn fetch_model(base_url: &str) -> Result<PathBuf> {
    let url = artifact_url(base_url, MODEL_FILE);
    let cache = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("classify-server");
    fs::create_dir_all(&cache).with_context(|| format!("creating {}", cache.display()))?;
    let model_path = cache.join(MODEL_FILE);

    let response = ureq::get(&url)
        .call()
        .with_context(|| format!("fetching {url}"))?;
    let mut reader = response.into_reader();
    let mut file = fs::File::create(&model_path)
        .with_context(|| format!("creating {}", model_path.display()))?;
    io::copy(&mut reader, &mut file).with_context(|| format!("writing {MODEL_FILE}"))?;
    Ok(model_path)
}
