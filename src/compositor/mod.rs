//! Watermark compositing
//!
//! A [`Compositor`] burns a watermark image into one media file (image or
//! video) and writes the result to a new path. The pipeline only ever talks
//! to the trait; [`FfmpegCompositor`] is the production implementation and
//! [`testing::RecordingCompositor`] stands in for it in tests.

pub mod ffmpeg;
pub mod testing;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

pub use ffmpeg::{FfmpegCompositor, FfmpegConfig};

/// Trait for watermark compositors.
///
/// Implementations are treated as trusted black boxes: the caller does not
/// check the overlay result, only whether the call succeeded.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Short human-readable name for logs
    fn name(&self) -> &'static str;

    /// Overlay `watermark` onto `media`, writing the composited file to `output`.
    ///
    /// `output` has the same file name (and so the same container format) as
    /// `media`. Its parent directory already exists.
    async fn overlay(&self, media: &Path, watermark: &Path, output: &Path) -> Result<()>;
}

/// Corner the watermark is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayPosition {
    /// Top left corner
    TopLeft,
    /// Top right corner
    #[default]
    TopRight,
    /// Bottom left corner
    BottomLeft,
    /// Bottom right corner
    BottomRight,
    /// Centered, margin ignored
    Center,
}

impl OverlayPosition {
    /// Convert to ffmpeg `overlay` filter coordinates
    #[must_use]
    pub fn to_overlay_position(self, margin: u32) -> (String, String) {
        let m = margin.to_string();
        match self {
            Self::TopLeft => (m.clone(), m),
            Self::TopRight => (format!("main_w-overlay_w-{m}"), m),
            Self::BottomLeft => (m.clone(), format!("main_h-overlay_h-{m}")),
            Self::BottomRight => (
                format!("main_w-overlay_w-{m}"),
                format!("main_h-overlay_h-{m}"),
            ),
            Self::Center => (
                "(main_w-overlay_w)/2".to_string(),
                "(main_h-overlay_h)/2".to_string(),
            ),
        }
    }

    /// Full `overlay=x:y` filter expression
    #[must_use]
    pub fn filter(self, margin: u32) -> String {
        let (x, y) = self.to_overlay_position(margin);
        format!("overlay={x}:{y}")
    }
}
