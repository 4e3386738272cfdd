use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use classify_server::cli::Args;
use classify_server::model::{ClassifierModel, ModelSource};
use classify_server::service::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let state = Arc::new(AppState::new(args.max_upload_bytes));

    // Load in the background so the server comes up immediately and reports
    // not-ready until the model arrives. A failed load is logged and the
    // process keeps serving 503s; there is no retry.
    let source = ModelSource {
        base_url: args.model_url.clone(),
        cuda: args.cuda,
    };
    let loader_state = state.clone();
    tokio::task::spawn_blocking(move || match ClassifierModel::load(&source) {
        Ok(model) => loader_state.publish_model(model),
        Err(err) => error!(error = ?err, "error loading model"),
    });

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "server running");
    axum::serve(listener, router(state)).await?;

    Ok(())
}
