//! Request handlers for the upload form

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{Html, IntoResponse},
    Json,
};
use std::path::{Path, PathBuf};

use crate::web::{AppState, UploadResponse, NO_FILE_MESSAGE, UNKNOWN_ERROR_MESSAGE};

/// Multipart field carrying the image
const IMAGE_FIELD: &str = "image";

const INDEX_HTML: &str = include_str!("../../templates/index.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// An uploaded file as received from the form
struct Upload {
    file_name: Option<String>,
    data:      Vec<u8>,
}

pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> impl IntoResponse {
    let upload = match multipart {
        Ok(multipart) => match find_image(multipart).await {
            Ok(upload) => upload,
            Err(e) => {
                tracing::error!("Upload failed: {e:#}");
                return Json(UploadResponse::failure(UNKNOWN_ERROR_MESSAGE));
            }
        },
        // Not a multipart request at all
        Err(_) => None,
    };

    let Some(upload) = upload else {
        return Json(UploadResponse::failure(NO_FILE_MESSAGE));
    };

    match caption_upload(&state, upload).await {
        Ok(results) => Json(UploadResponse::captions(results)),
        Err(e) => {
            tracing::error!("Captioning failed: {e:#}");
            Json(UploadResponse::failure(UNKNOWN_ERROR_MESSAGE))
        }
    }
}

async fn find_image(mut multipart: Multipart) -> Result<Option<Upload>> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().map(str::to_string);
        let data      = field.bytes().await?.to_vec();
        return Ok(Some(Upload { file_name, data }));
    }
    Ok(None)
}

async fn caption_upload(state: &AppState, upload: Upload) -> Result<Vec<String>> {
    let path = stored_path(&state.upload_dir, upload.file_name.as_deref());
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&path, &upload.data)
        .await
        .with_context(|| format!("Cannot store upload at '{}'", path.display()))?;
    tracing::info!("Saved upload to {}", path.display());

    let captioner = state.captioner.clone();
    tokio::task::spawn_blocking(move || captioner.blocking_lock().caption(&upload.data))
        .await
        .map_err(|e| anyhow!("Captioning task failed: {e}"))?
}

/// `<upload_dir>/image/<uuid>.<ext>`, keeping the client's extension.
fn stored_path(upload_dir: &Path, file_name: Option<&str>) -> PathBuf {
    let ext = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "jpg".to_string());

    upload_dir
        .join("image")
        .join(format!("{}.{ext}", uuid::Uuid::new_v4()))
}
