//! Per-request scratch directory
//!
//! Layout under the directory root:
//!
//! ```text
//! upload/<field>/<filename>   uploaded form files
//! in/<entry>                  media entries written out for the compositor
//! out/<entry>                 compositor results
//! ```
//!
//! The directory is removed when the [`WorkDir`] is dropped, on success and
//! on every early error return alike. With `keep` set it is left on disk for
//! inspection instead.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{Result, WatermarkError};

const UPLOAD_DIR: &str = "upload";
const INPUT_DIR: &str = "in";
const OUTPUT_DIR: &str = "out";

enum Inner {
    Scoped(TempDir),
    Kept(PathBuf),
}

/// Scoped working directory owning all on-disk intermediates of one request
pub struct WorkDir {
    inner: Inner,
}

impl WorkDir {
    /// Create a uniquely named directory under `root` (system temp dir when `None`).
    pub fn create(root: Option<&Path>, keep: bool) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("watermark_");
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(WatermarkError::TempDir)?;

        for sub in [UPLOAD_DIR, INPUT_DIR, OUTPUT_DIR] {
            let path = dir.path().join(sub);
            std::fs::create_dir(&path).map_err(|e| WatermarkError::io(&path, e))?;
        }

        let inner = if keep {
            let path = dir.keep();
            debug!("Created temp dir {} (kept)", path.display());
            Inner::Kept(path)
        } else {
            debug!("Created temp dir {}", dir.path().display());
            Inner::Scoped(dir)
        };
        Ok(Self { inner })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match &self.inner {
            Inner::Scoped(dir) => dir.path(),
            Inner::Kept(path) => path,
        }
    }

    /// Whether the directory survives this value being dropped
    #[must_use]
    pub fn is_kept(&self) -> bool {
        matches!(self.inner, Inner::Kept(_))
    }

    /// Directory holding one form field's upload
    #[must_use]
    pub fn upload_dir(&self, field: &str) -> PathBuf {
        self.path().join(UPLOAD_DIR).join(field)
    }

    /// Where an archive entry is materialized before compositing
    #[must_use]
    pub fn input_path(&self, entry: &Path) -> PathBuf {
        self.path().join(INPUT_DIR).join(entry)
    }

    /// Where the compositor writes its result for an entry
    #[must_use]
    pub fn output_path(&self, entry: &Path) -> PathBuf {
        self.path().join(OUTPUT_DIR).join(entry)
    }
}

impl std::fmt::Debug for WorkDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkDir")
            .field("path", &self.path())
            .field("kept", &self.is_kept())
            .finish()
    }
}
