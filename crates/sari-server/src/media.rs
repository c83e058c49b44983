//! Local media storage for profile pictures, post images and chat media.
//!
//! Files land in `<upload_dir>/<folder>/<uuid>.<ext>` and are served back
//! under `/uploads/<folder>/<file>`.

use axum::extract::multipart::Field;
use std::path::PathBuf;

use crate::config::MAX_UPLOAD_BYTES;
use crate::error::{ApiError, ApiResult};

/// Upload folders. Each maps to one subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Profiles,
    Posts,
    Chat,
}

impl Folder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Profiles => "profiles",
            Folder::Posts => "posts",
            Folder::Chat => "chat",
        }
    }
}

/// A file read from a multipart field, not yet written to disk.
#[derive(Debug)]
pub struct Upload {
    pub original_name: Option<String>,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Drain a multipart field, enforcing the upload size limit while
    /// reading rather than after buffering everything.
    pub async fn read(mut field: Field<'_>) -> ApiResult<Self> {
        let original_name = field.file_name().map(str::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await? {
            if bytes.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(ApiError::PayloadTooLarge(format!(
                    "File too large (max {} MB)",
                    MAX_UPLOAD_BYTES / (1024 * 1024)
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(Self { original_name, bytes })
    }
}

pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write an upload and return `(stored_filename, public_url)`.
    /// Empty uploads store nothing and yield an empty URL.
    pub async fn save(&self, folder: Folder, upload: &Upload) -> ApiResult<Option<(String, String)>> {
        if upload.bytes.is_empty() {
            return Ok(None);
        }
        if upload.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ApiError::PayloadTooLarge("File too large".to_string()));
        }

        let dir = self.root.join(folder.as_str());
        tokio::fs::create_dir_all(&dir).await?;

        let filename = match upload.original_name.as_deref().and_then(safe_extension) {
            Some(ext) => format!("{}.{ext}", uuid::Uuid::new_v4()),
            None => uuid::Uuid::new_v4().to_string(),
        };
        tokio::fs::write(dir.join(&filename), &upload.bytes).await?;

        let url = format!("/uploads/{}/{filename}", folder.as_str());
        Ok(Some((filename, url)))
    }
}

/// Lowercased extension of a client filename, if it is short and plain
/// alphanumeric. Anything else is dropped so client names never reach
/// the filesystem.
fn safe_extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
