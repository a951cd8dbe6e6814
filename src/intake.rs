//! Multipart form intake
//!
//! Collects the file parts of an upload form, then persists the ones the
//! pipeline needs into the request's working directory.
//!
//! - Only parts carrying a filename are kept; plain text fields are ignored
//! - The first file submitted under a field name wins
//! - A missing field, a blank filename and a zero-byte payload all count as
//!   "not submitted"

use std::collections::HashMap;
use std::path::PathBuf;

use axum::extract::Multipart;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, WatermarkError};
use crate::sanitize;
use crate::workdir::WorkDir;

/// Form field carrying the watermark image
pub const WATERMARK_FIELD: &str = "png";
/// Form field carrying the zip container
pub const CONTAINER_FIELD: &str = "zip";

/// A file part as submitted
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename, untouched
    pub file_name: String,
    pub data: Bytes,
}

/// All file parts of one request, keyed by field name
#[derive(Debug, Clone, Default)]
pub struct UploadForm {
    files: HashMap<String, UploadedFile>,
}

/// An upload written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedUpload {
    /// Sanitized original filename
    pub name: String,
    pub path: PathBuf,
}

impl UploadForm {
    /// Drain a multipart body. Any parse error, including hitting the body
    /// size limit, is a [`WatermarkError::Multipart`].
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| WatermarkError::Multipart(e.body_text()))?
        {
            let (Some(name), Some(file_name)) = (field.name(), field.file_name()) else {
                continue;
            };
            let (name, file_name) = (name.to_string(), file_name.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| WatermarkError::Multipart(e.body_text()))?;
            debug!("Received form file {} ({} bytes) as {}", file_name, data.len(), name);
            form.insert(name, UploadedFile { file_name, data });
        }
        Ok(form)
    }

    /// Add a file part unless the field already has one
    pub fn insert(&mut self, field: impl Into<String>, file: UploadedFile) {
        self.files.entry(field.into()).or_insert(file);
    }

    #[must_use]
    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.get(field)
    }

    /// Write the file submitted under `field` to `<workdir>/upload/<field>/<filename>`.
    pub async fn persist(&self, work: &WorkDir, field: &'static str) -> Result<SavedUpload> {
        let missing = || {
            debug!("Error bad request: no file in field {}", field);
            WatermarkError::MissingField(field)
        };
        let file = self.file(field).ok_or_else(missing)?;
        if file.data.is_empty() {
            return Err(missing());
        }
        let name = sanitize::upload_file_name(&file.file_name).ok_or_else(missing)?;

        let dir = work.upload_dir(field);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| WatermarkError::io(&dir, e))?;
        let path = dir.join(&name);
        fs::write(&path, &file.data).await.map_err(|e| {
            debug!("Error write {}: {}", path.display(), e);
            WatermarkError::io(&path, e)
        })?;

        debug!("Saved form file {} to {}", name, path.display());
        Ok(SavedUpload { name, path })
    }
}
