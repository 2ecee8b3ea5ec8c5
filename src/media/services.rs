use anyhow::Context;
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    storage::ObjectStore,
};

pub const MAX_IMAGE_BYTES: usize = 6 * 1024 * 1024;
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_FILES: usize = 6;

pub const IMAGE_TOO_LARGE: &str = "File too large. Max size allowed is 6MB.";
pub const FILE_TOO_LARGE: &str = "File too large. Max allowed size is 10MB.";

#[derive(Debug, Clone)]
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
}

/// Result row returned by the multi-file upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn ensure_image(item: &UploadItem) -> AppResult<()> {
    if !item.content_type.starts_with("image/") {
        return Err(AppError::validation("Only image files are allowed!"));
    }
    if item.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation(IMAGE_TOO_LARGE));
    }
    Ok(())
}

pub async fn upload_object(
    storage: &dyn ObjectStore,
    prefix: &str,
    item: UploadItem,
) -> anyhow::Result<StoredObject> {
    let ext = ext_from_mime(&item.content_type)
        .map(str::to_string)
        .or_else(|| item.file_name.as_deref().and_then(ext_from_name))
        .unwrap_or_else(|| "bin".to_string());
    let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    let url = storage.public_url(&key);
    info!(%key, "object uploaded");
    Ok(StoredObject { key, url })
}

/// Uploads each file independently; one failure does not abort the rest.
pub async fn upload_many(storage: &dyn ObjectStore, items: Vec<UploadItem>) -> AppResult<Vec<UploadOutcome>> {
    if items.is_empty() {
        return Err(AppError::validation("No media files uploaded."));
    }
    if items.len() > MAX_FILES {
        return Err(AppError::validation(format!(
            "Too many files. At most {MAX_FILES} files are allowed."
        )));
    }
    if items.iter().any(|i| i.body.len() > MAX_FILE_BYTES) {
        return Err(AppError::validation(FILE_TOO_LARGE));
    }

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let content_type = item.content_type.clone();
        let file_name = item.file_name.clone();
        match upload_object(storage, "media", item).await {
            Ok(obj) => out.push(UploadOutcome {
                success: true,
                url: Some(obj.url),
                content_type,
                file: None,
                error: None,
            }),
            Err(e) => {
                warn!(error = %e, file = ?file_name, "media upload failed");
                out.push(UploadOutcome {
                    success: false,
                    url: None,
                    content_type,
                    file: file_name,
                    error: Some("Failed to upload".into()),
                });
            }
        }
    }
    Ok(out)
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        "image/gif" => Some("gif"),
        "video/mp4" => Some("mp4"),
        "application/pdf" => Some("pdf"),
        _ => None,
    }
}

fn ext_from_name(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStorage;

    fn item(ct: &str, len: usize, name: &str) -> UploadItem {
        UploadItem {
            body: Bytes::from(vec![0u8; len]),
            content_type: ct.into(),
            file_name: Some(name.into()),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn test_ext_from_name() {
        assert_eq!(ext_from_name("notes.TXT"), Some("txt".into()));
        assert_eq!(ext_from_name("archive.tar.gz"), Some("gz".into()));
        assert_eq!(ext_from_name("noext"), None);
        assert_eq!(ext_from_name("weird.$$$"), None);
    }

    #[test]
    fn image_rules() {
        assert!(ensure_image(&item("image/png", 10, "a.png")).is_ok());
        assert!(ensure_image(&item("text/plain", 10, "a.txt")).is_err());
        assert!(ensure_image(&item("image/png", MAX_IMAGE_BYTES + 1, "a.png")).is_err());
    }

    #[tokio::test]
    async fn upload_object_uses_prefix_and_public_url() {
        let storage = FakeStorage::default();
        let obj = upload_object(&storage, "profiles", item("image/png", 4, "me.png"))
            .await
            .unwrap();
        assert!(obj.key.starts_with("profiles/"));
        assert!(obj.key.ends_with(".png"));
        assert_eq!(obj.url, format!("https://cdn.test/{}", obj.key));
        assert!(storage.contains(&obj.key));
    }

    #[tokio::test]
    async fn upload_many_limits() {
        let storage = FakeStorage::default();
        assert!(upload_many(&storage, vec![]).await.is_err());

        let seven = (0..7).map(|i| item("text/plain", 1, &format!("{i}.txt"))).collect();
        assert!(upload_many(&storage, seven).await.is_err());

        let big = vec![item("video/mp4", MAX_FILE_BYTES + 1, "big.mp4")];
        assert!(upload_many(&storage, big).await.is_err());
    }

    #[tokio::test]
    async fn upload_many_reports_each_file() {
        let storage = FakeStorage::rejecting("text/plain");
        let files = vec![
            item("application/pdf", 3, "doc.pdf"),
            item("text/plain", 3, "bad.txt"),
        ];
        let out = upload_many(&storage, files).await.unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[0].success);
        assert!(out[0].url.as_deref().unwrap().ends_with(".pdf"));
        assert!(!out[1].success);
        assert_eq!(out[1].file.as_deref(), Some("bad.txt"));
        assert_eq!(out[1].content_type, "text/plain");
    }
}
