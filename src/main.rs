//! `watermarker` - HTTP service that watermarks the media inside uploaded zips

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use watermarker::{server, Config, OverlayPosition};

#[derive(Parser)]
#[command(name = "watermarker")]
#[command(about = "Serve an upload form that watermarks every image and video in a zip")]
#[command(version)]
struct Cli {
    /// Verbose diagnostics; keep per-request temp directories for inspection
    #[arg(short, long)]
    debug: bool,

    /// Address to listen on (default 0.0.0.0:8848)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// TOML config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ffmpeg binary to run
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Corner the watermark is anchored to
    #[arg(long, value_enum)]
    position: Option<PositionArg>,

    /// Distance from the anchored edges, in pixels
    #[arg(long)]
    margin: Option<u32>,

    /// Largest accepted upload, in MiB
    #[arg(long)]
    max_upload_mb: Option<usize>,

    /// Largest total size one zip may unpack to, in MiB
    #[arg(long)]
    max_unpacked_mb: Option<u64>,

    /// ffmpeg processes allowed per request
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Directory under which per-request working directories are created
    #[arg(long)]
    temp_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PositionArg {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

impl From<PositionArg> for OverlayPosition {
    fn from(arg: PositionArg) -> Self {
        match arg {
            PositionArg::TopLeft => Self::TopLeft,
            PositionArg::TopRight => Self::TopRight,
            PositionArg::BottomLeft => Self::BottomLeft,
            PositionArg::BottomRight => Self::BottomRight,
            PositionArg::Center => Self::Center,
        }
    }
}

impl Cli {
    fn into_config(self) -> Result<Config> {
        let mut config = match self.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.debug |= self.debug;
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(path) = self.ffmpeg {
            config.ffmpeg.ffmpeg_path = path;
        }
        if let Some(position) = self.position {
            config.ffmpeg.position = position.into();
        }
        if let Some(margin) = self.margin {
            config.ffmpeg.margin = margin;
        }
        if let Some(mb) = self.max_upload_mb {
            config.max_upload_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(mb) = self.max_unpacked_mb {
            config.max_unpacked_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(jobs) = self.jobs {
            config.max_concurrent_compositions = jobs.max(1);
        }
        if let Some(root) = self.temp_root {
            config.temp_root = Some(root);
        }
        Ok(config)
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "watermarker=debug"
    } else {
        "watermarker=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    init_tracing(config.debug);

    server::serve(config).await
}
