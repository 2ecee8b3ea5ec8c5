use axum::{
    extract::{DefaultBodyLimit, State},
    routing::post,
    Router,
};
use serde::Serialize;
use tracing::{error, instrument};

use super::{
    form::{FormData, ImageForm},
    services::{ensure_image, upload_many, upload_object, UploadOutcome, MAX_FILES, MAX_FILE_BYTES},
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppResult},
    response::ApiResponse,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct UploadedMedia {
    pub url: String,
}

pub fn media_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/upload_media", post(upload_media))
        .route("/auth/upload_multiple_files", post(upload_multiple_files))
        .layer(DefaultBodyLimit::max(MAX_FILES * MAX_FILE_BYTES + 1024 * 1024))
}

/// POST /auth/upload_media (multipart, one image in `file` or `profile_pic`)
#[instrument(skip(state, form), fields(user_id = %user.id))]
pub async fn upload_media(
    State(state): State<AppState>,
    user: AuthUser,
    ImageForm(mut form): ImageForm,
) -> AppResult<ApiResponse<UploadedMedia>> {
    let item = form
        .take_file("file")
        .or_else(|| form.take_file("profile_pic"))
        .ok_or_else(|| AppError::validation("No file uploaded. Please upload an image"))?;
    ensure_image(&item)?;

    let stored = upload_object(state.storage.as_ref(), "media", item)
        .await
        .map_err(|e| {
            error!(error = %e, "media upload failed");
            AppError::upstream("Failed to upload media")
        })?;

    Ok(ApiResponse::with_data(
        "Media uploaded successfully",
        UploadedMedia { url: stored.url },
    ))
}

/// POST /auth/upload_multiple_files (multipart, up to six `upload_files`)
#[instrument(skip(state, form), fields(user_id = %user.id))]
pub async fn upload_multiple_files(
    State(state): State<AppState>,
    user: AuthUser,
    mut form: FormData,
) -> AppResult<ApiResponse<Vec<UploadOutcome>>> {
    let files = form.take_files("upload_files");
    let results = upload_many(state.storage.as_ref(), files).await?;
    let uploaded = results.iter().filter(|r| r.success).count();
    Ok(ApiResponse::with_data(
        format!("{uploaded} of {} files uploaded", results.len()),
        results,
    ))
}
