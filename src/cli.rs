use clap::Parser;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL hosting model.onnx and metadata.json
    #[arg(long, env = "MODEL_URL", required = true)]
    pub model_url: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Maximum accepted image payload in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,

    /// Run inference on the CUDA execution provider
    #[arg(long, default_value_t = false)]
    pub cuda: bool,
}
