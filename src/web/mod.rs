// ============================================================
// Layer 7 — Web Upload Form
// ============================================================
// A two-route axum server around one loaded captioner:
//
//   GET  /        → upload form (templates/index.html)
//   POST /upload  → multipart field `image` → JSON captions
//   GET  /upload  → same handler; answers "No file found!"
//
// The captioner sits behind an async mutex and is only touched
// from the blocking pool, one request at a time.

mod handlers;
mod types;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::get,
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::domain::traits::ImageCaptioner;

pub use handlers::*;
pub use types::*;

/// Largest accepted upload body
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// State shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub captioner:  Arc<Mutex<Box<dyn ImageCaptioner>>>,
    /// Uploads are stored under `<upload_dir>/image/`
    pub upload_dir: PathBuf,
}

impl AppState {
    pub fn new(captioner: Box<dyn ImageCaptioner>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            captioner:  Arc::new(Mutex::new(captioner)),
            upload_dir: upload_dir.into(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/upload", get(upload_image).post(upload_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(addr: &str, state: AppState) -> Result<()> {
    tracing::info!("Starting caption server on {}", addr);

    let app      = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Cannot bind to {addr}"))?;

    axum::serve(listener, app).await?;
    Ok(())
}
