//! `Watermarker` - burn a watermark into every image and video of a zip
//!
//! Upload a zip and a PNG; get the same zip back with the PNG overlaid on
//! every `.bmp`, `.jpg`, `.png` and `.mp4` entry. Everything else is copied
//! through unchanged, names and order preserved.
//!
//! # Pipeline
//!
//! - **Intake** - multipart form files land in a per-request [`WorkDir`]
//! - **Transcode** - entries are walked in order; media goes through a
//!   [`Compositor`], the rest is copied
//! - **Rebuild** - a fresh store-only zip is assembled in memory and sent
//!   back as an attachment
//!
//! # Example
//!
//! ```rust,no_run
//! use watermarker::{server, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     server::serve(Config::default()).await
//! }
//! ```

pub mod archive;
pub mod compositor;
pub mod config;
pub mod error;
pub mod intake;
pub mod sanitize;
pub mod server;
pub mod transcode;
pub mod workdir;

pub use archive::{ArchiveBuilder, ArchiveEntry, EntryKind, MEDIA_EXTENSIONS};
pub use compositor::{Compositor, FfmpegCompositor, FfmpegConfig, OverlayPosition};
pub use config::Config;
pub use error::{ErrorClass, Result, WatermarkError};
pub use intake::{SavedUpload, UploadForm, UploadedFile};
pub use server::{router, AppState};
pub use transcode::{TranscodeStats, Transcoded, Transcoder};
pub use workdir::WorkDir;
