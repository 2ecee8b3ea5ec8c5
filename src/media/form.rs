use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
    http::StatusCode,
};
use tracing::warn;

use super::services::{UploadItem, FILE_TOO_LARGE, IMAGE_TOO_LARGE};
use crate::error::{AppError, AppResult};

/// A fully buffered multipart body: text fields by name, files in arrival order.
#[derive(Debug, Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: Vec<(String, UploadItem)>,
}

impl FormData {
    /// Trimmed text value; blank counts as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadItem> {
        let idx = self.files.iter().position(|(n, _)| n == name)?;
        Some(self.files.remove(idx).1)
    }

    pub fn take_files(&mut self, name: &str) -> Vec<UploadItem> {
        let (matching, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.files).into_iter().partition(|(n, _)| n == name);
        self.files = rest;
        matching.into_iter().map(|(_, item)| item).collect()
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for FormData {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mp = Multipart::from_request(req, state).await?;
        read_form(mp, FILE_TOO_LARGE).await
    }
}

/// Form whose files are images; an oversized body reports the image limit.
#[derive(Debug)]
pub struct ImageForm(pub FormData);

#[async_trait]
impl<S: Send + Sync> FromRequest<S> for ImageForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mp = Multipart::from_request(req, state).await?;
        Ok(ImageForm(read_form(mp, IMAGE_TOO_LARGE).await?))
    }
}

fn field_error(e: MultipartError, too_large: &str, what: String) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation(too_large)
    } else {
        warn!(error = %e, "malformed multipart body");
        AppError::validation(format!("{what}: {e}"))
    }
}

/// Parts carrying a filename are treated as files, everything else as text.
/// A body over the route's limit fails with `too_large`.
pub async fn read_form(mut mp: Multipart, too_large: &str) -> AppResult<FormData> {
    let mut form = FormData::default();
    loop {
        let field = match mp.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(field_error(e, too_large, "Invalid form data".into())),
        };

        let name = field.name().unwrap_or_default().trim_end_matches("[]").to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        if let Some(file_name) = file_name {
            let body = field
                .bytes()
                .await
                .map_err(|e| field_error(e, too_large, "Failed to read upload".into()))?;
            form.files.push((
                name,
                UploadItem {
                    body,
                    content_type: content_type
                        .unwrap_or_else(|| "application/octet-stream".into()),
                    file_name: Some(file_name),
                },
            ));
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| field_error(e, too_large, format!("Invalid form field {name}")))?;
            form.fields.insert(name, value);
        }
    }
    Ok(form)
}
