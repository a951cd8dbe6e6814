//! Server configuration
//!
//! Built from defaults, then an optional TOML file, then command-line
//! overrides (applied by the binary). The resulting [`Config`] is handed to
//! the server once at startup; nothing reads it from a global.
//!
//! ```toml
//! listen = "0.0.0.0:8848"
//! debug = false
//! ffmpeg = "/usr/local/bin/ffmpeg"
//! position = "top-right"
//! margin = 10
//! max_upload_mb = 256
//! max_unpacked_mb = 1024
//! jobs = 4
//! temp_root = "/var/tmp"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::compositor::{FfmpegConfig, OverlayPosition};

/// Port the service has always listened on
pub const DEFAULT_PORT: u16 = 8848;

/// Default cap on a whole multipart request body
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

/// Default cap on the decompressed size of one container
pub const DEFAULT_MAX_UNPACKED_BYTES: u64 = 1024 * 1024 * 1024;

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind
    pub listen: SocketAddr,
    /// Verbose diagnostics and retained working directories
    pub debug: bool,
    /// Compositor settings
    pub ffmpeg: FfmpegConfig,
    /// Largest accepted request body, in bytes
    pub max_upload_bytes: usize,
    /// Largest total size a container may unpack to, in bytes
    pub max_unpacked_bytes: u64,
    /// Compositor processes allowed per request
    pub max_concurrent_compositions: usize,
    /// Parent of per-request working directories (system temp dir when `None`)
    pub temp_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            debug: false,
            ffmpeg: FfmpegConfig::default(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_unpacked_bytes: DEFAULT_MAX_UNPACKED_BYTES,
            max_concurrent_compositions: default_jobs(),
            temp_root: None,
        }
    }
}

fn default_jobs() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

/// On-disk shape of the config file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub listen: Option<SocketAddr>,
    pub debug: Option<bool>,
    pub ffmpeg: Option<PathBuf>,
    pub position: Option<OverlayPosition>,
    pub margin: Option<u32>,
    pub max_upload_mb: Option<usize>,
    pub max_unpacked_mb: Option<u64>,
    pub jobs: Option<usize>,
    pub temp_root: Option<PathBuf>,
}

impl FileConfig {
    /// Read and parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
    }
}

impl Config {
    /// Overlay every key present in `file` onto `self`
    #[must_use]
    pub fn merge(mut self, file: FileConfig) -> Self {
        if let Some(listen) = file.listen {
            self.listen = listen;
        }
        if let Some(debug) = file.debug {
            self.debug = debug;
        }
        if let Some(path) = file.ffmpeg {
            self.ffmpeg.ffmpeg_path = path;
        }
        if let Some(position) = file.position {
            self.ffmpeg.position = position;
        }
        if let Some(margin) = file.margin {
            self.ffmpeg.margin = margin;
        }
        if let Some(mb) = file.max_upload_mb {
            self.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(mb) = file.max_unpacked_mb {
            self.max_unpacked_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(jobs) = file.jobs {
            self.max_concurrent_compositions = jobs.max(1);
        }
        if let Some(root) = file.temp_root {
            self.temp_root = Some(root);
        }
        self
    }

    /// Defaults merged with the file at `path`
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::default().merge(FileConfig::load(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_legacy_service() {
        let config = Config::default();
        assert_eq!(config.listen.port(), 8848);
        assert!(!config.debug);
        assert_eq!(config.ffmpeg.margin, 10);
        assert_eq!(config.ffmpeg.position, OverlayPosition::TopRight);
        assert!(config.max_concurrent_compositions >= 1);
        assert_eq!(config.max_unpacked_bytes, DEFAULT_MAX_UNPACKED_BYTES);
        assert!(config.temp_root.is_none());
    }

    #[test]
    fn parse_empty_config() {
        let file: FileConfig = toml::from_str("").unwrap();
        assert!(file.listen.is_none());
        let config = Config::default().merge(file);
        assert_eq!(config.listen.port(), DEFAULT_PORT);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
listen = "127.0.0.1:9000"
debug = true
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"
position = "bottom-right"
margin = 24
max_upload_mb = 8
max_unpacked_mb = 32
jobs = 0
temp_root = "/var/tmp"
"#;
        let file: FileConfig = toml::from_str(toml_str).unwrap();
        let config = Config::default().merge(file);

        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert!(config.debug);
        assert_eq!(config.ffmpeg.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.ffmpeg.position, OverlayPosition::BottomRight);
        assert_eq!(config.ffmpeg.margin, 24);
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(config.max_unpacked_bytes, 32 * 1024 * 1024);
        assert_eq!(config.max_concurrent_compositions, 1);
        assert_eq!(config.temp_root, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<FileConfig>("port = 1").is_err());
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarker.toml");
        std::fs::write(&path, "listen = 12").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("watermarker.toml"));
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
