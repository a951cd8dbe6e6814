//! ffmpeg-based watermark compositor
//!
//! Runs one ffmpeg process per media file:
//!
//! ```text
//! ffmpeg -i <media> -i <watermark> -filter_complex overlay=... -codec:a copy <out>
//! ```
//!
//! Audio streams are copied untouched; the output container follows the
//! output file extension.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{Compositor, OverlayPosition};

/// Where ffmpeg was historically installed on the deployment hosts
const LEGACY_FFMPEG_PATH: &str = "/usr/local/bin/ffmpeg";

/// Audio streams are passed through untouched
const AUDIO_CODEC: &str = "copy";

/// Configuration for the ffmpeg compositor
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: PathBuf,
    /// Corner the watermark is anchored to
    pub position: OverlayPosition,
    /// Distance from the anchored edges, in pixels
    pub margin: u32,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            position: OverlayPosition::default(),
            margin: 10,
        }
    }
}

impl FfmpegConfig {
    /// Specify custom ffmpeg binary path
    #[must_use]
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Anchor the watermark to a different corner
    #[must_use]
    pub fn with_position(mut self, position: OverlayPosition, margin: u32) -> Self {
        self.position = position;
        self.margin = margin;
        self
    }
}

/// Prefer the legacy install location, then `PATH`, then a bare name.
pub fn default_ffmpeg_path() -> PathBuf {
    let legacy = Path::new(LEGACY_FFMPEG_PATH);
    if legacy.is_file() {
        return legacy.to_path_buf();
    }
    which::which("ffmpeg").unwrap_or_else(|_| PathBuf::from("ffmpeg"))
}

/// ffmpeg subprocess compositor
#[derive(Debug, Clone, Default)]
pub struct FfmpegCompositor {
    config: FfmpegConfig,
}

impl FfmpegCompositor {
    #[must_use]
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    /// Check if ffmpeg is available
    pub async fn check_available(&self) -> bool {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Build ffmpeg arguments
    fn build_args(&self, media: &Path, watermark: &Path, output: &Path) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-y"]
            .iter()
            .map(std::string::ToString::to_string)
            .collect();

        args.push("-i".to_string());
        args.push(media.to_string_lossy().into_owned());
        args.push("-i".to_string());
        args.push(watermark.to_string_lossy().into_owned());

        args.push("-filter_complex".to_string());
        args.push(self.config.position.filter(self.config.margin));

        args.push("-codec:a".to_string());
        args.push(AUDIO_CODEC.to_string());

        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait]
impl Compositor for FfmpegCompositor {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn overlay(&self, media: &Path, watermark: &Path, output: &Path) -> Result<()> {
        let args = self.build_args(media, watermark, output);
        debug!("Run ffmpeg {:?}", args);

        let result = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.config.ffmpeg_path.display()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            debug!("ffmpeg stderr for {}: {}", media.display(), stderr.trim());
            return Err(anyhow!("ffmpeg exited with status: {}", result.status));
        }

        info!("Composited {}", output.display());
        Ok(())
    }
}
