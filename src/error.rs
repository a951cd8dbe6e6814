//! Error taxonomy for the watermark pipeline
//!
//! Every step returns a single [`WatermarkError`] on first failure. The
//! HTTP layer only looks at [`WatermarkError::class`]; the message itself is
//! diagnostic and never reaches the client.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum WatermarkError {
    #[error("missing or empty form field: {0}")]
    MissingField(&'static str),

    #[error("malformed multipart body: {0}")]
    Multipart(String),

    #[error("unsafe name {name:?}: {reason}")]
    UnsafeName { name: String, reason: &'static str },

    #[error("failed to create working directory: {0}")]
    TempDir(#[source] std::io::Error),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive unpacks to more than {limit} bytes")]
    ArchiveTooLarge { limit: u64 },

    #[error("compositor failed on {entry}: {message}")]
    Compositor { entry: String, message: String },

    #[error("worker task failed: {0}")]
    Join(String),
}

/// Which side of the connection caused an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed request, missing fields, hostile names
    BadRequest,
    /// Everything the client could not have caused
    Internal,
}

impl WatermarkError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::MissingField(_)
            | Self::Multipart(_)
            | Self::UnsafeName { .. }
            | Self::ArchiveTooLarge { .. } => ErrorClass::BadRequest,
            Self::TempDir(_)
            | Self::Io { .. }
            | Self::Archive(_)
            | Self::Compositor { .. }
            | Self::Join(_) => ErrorClass::Internal,
        }
    }
}

impl From<tokio::task::JoinError> for WatermarkError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Join(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WatermarkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_bad_requests() {
        assert_eq!(
            WatermarkError::MissingField("png").class(),
            ErrorClass::BadRequest
        );
        assert_eq!(
            WatermarkError::Multipart("eof".into()).class(),
            ErrorClass::BadRequest
        );
        let unsafe_name = WatermarkError::UnsafeName {
            name: "../etc/passwd".into(),
            reason: "parent directory component",
        };
        assert_eq!(unsafe_name.class(), ErrorClass::BadRequest);
        assert_eq!(
            WatermarkError::ArchiveTooLarge { limit: 1024 }.class(),
            ErrorClass::BadRequest
        );
    }

    #[test]
    fn environment_errors_are_internal() {
        let io = WatermarkError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.class(), ErrorClass::Internal);
        assert!(io.to_string().contains("/tmp/x"));

        let comp = WatermarkError::Compositor {
            entry: "a.png".into(),
            message: "exit status: 1".into(),
        };
        assert_eq!(comp.class(), ErrorClass::Internal);
        assert_eq!(
            WatermarkError::Archive(zip::result::ZipError::FileNotFound).class(),
            ErrorClass::Internal
        );
    }
}
