//! Response building and error mapping

use axum::response::{IntoResponse, Response};
use http::{header, StatusCode};
use tracing::debug;

use crate::error::{ErrorClass, WatermarkError};

/// Pipeline error as an HTTP response
#[derive(Debug)]
pub struct AppError(pub WatermarkError);

impl From<WatermarkError> for AppError {
    fn from(err: WatermarkError) -> Self {
        Self(err)
    }
}

impl AppError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self.0.class() {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        debug!("Error {}: {}", status.as_u16(), self.0);
        // Generic reason phrase only; details stay in the log
        let body = status.canonical_reason().unwrap_or("Error");
        (status, body).into_response()
    }
}

/// Rebuilt container name: `photos.zip` -> `photos.watermark.zip`
#[must_use]
pub fn attachment_name(original: &str) -> String {
    match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{stem}.watermark.{ext}")
        }
        _ => format!("{original}.watermark.zip"),
    }
}

/// `Content-Disposition` value for a download named `file_name`.
///
/// ASCII names go out as a plain quoted `filename`. Anything else gets an
/// ASCII fallback plus an RFC 5987 `filename*`.
#[must_use]
pub fn content_disposition(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c == ' ' || c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect();

    if fallback == file_name {
        format!("attachment; filename=\"{file_name}\"")
    } else {
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(file_name)
        )
    }
}

pub(super) fn attachment(file_name: &str, archive: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, content_disposition(file_name)),
        ],
        archive,
    )
        .into_response()
}
