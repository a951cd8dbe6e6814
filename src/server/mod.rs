//! HTTP front end
//!
//! One route, `/`:
//!
//! - `GET` serves the upload form
//! - any other method, `HEAD` included, runs the pipeline: parse multipart
//!   -> working dir -> watermark image -> container -> transcode -> respond
//!   with the rebuilt zip as an attachment
//!
//! Client mistakes answer 400, everything else 500. Neither carries any
//! detail; the detail goes to the debug log.

mod response;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::connect_info::ConnectInfo;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::compositor::{Compositor, FfmpegCompositor};
use crate::config::Config;
use crate::error::WatermarkError;
use crate::intake::{UploadForm, CONTAINER_FIELD, WATERMARK_FIELD};
use crate::transcode::Transcoder;
use crate::workdir::WorkDir;

pub use response::{attachment_name, content_disposition, AppError};

/// Upload form served on `GET /`
pub const UPLOAD_FORM: &str = include_str!("form.html");

/// Per-process handler state, shared by all requests
#[derive(Debug, Clone)]
pub struct AppState {
    transcoder: Transcoder,
    debug: bool,
    temp_root: Option<PathBuf>,
}

impl AppState {
    pub fn new(transcoder: Transcoder, debug: bool, temp_root: Option<PathBuf>) -> Self {
        Self {
            transcoder,
            debug,
            temp_root,
        }
    }

    /// State for `config` using an arbitrary compositor
    pub fn with_compositor(config: &Config, compositor: Arc<dyn Compositor>) -> Self {
        Self::new(
            Transcoder::new(compositor, config.max_concurrent_compositions)
                .with_max_unpacked_bytes(config.max_unpacked_bytes),
            config.debug,
            config.temp_root.clone(),
        )
    }
}

/// Build the application router
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        // axum answers HEAD from the GET handler unless HEAD has its own
        .route("/", get(upload_form).head(process).fallback(process))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn(log_request))
        .with_state(Arc::new(state))
}

/// Bind `config.listen` and serve until Ctrl-C
pub async fn serve(config: Config) -> Result<()> {
    let compositor = FfmpegCompositor::new(config.ffmpeg.clone());
    if compositor.check_available().await {
        debug!("Using ffmpeg at {}", config.ffmpeg.ffmpeg_path.display());
    } else {
        warn!(
            "ffmpeg not runnable at {}; media entries will fail",
            config.ffmpeg.ffmpeg_path.display()
        );
    }

    let state = AppState::with_compositor(&config, Arc::new(compositor));
    let app = router(state, config.max_upload_bytes);

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("Start HTTP server on {}", config.listen);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn log_request(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.to_string());
    debug!(
        "Got HTTP request from {} {} {}",
        peer,
        request.method(),
        request.uri().path()
    );
    next.run(request).await
}

async fn upload_form() -> Html<&'static str> {
    Html(UPLOAD_FORM)
}

async fn process(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<Response, AppError> {
    let multipart = multipart.map_err(|e| WatermarkError::Multipart(e.body_text()))?;
    let form = UploadForm::from_multipart(multipart).await?;

    let work = WorkDir::create(state.temp_root.as_deref(), state.debug)?;
    let result = watermark(&state, &form, &work).await;
    release(work).await;

    let (file_name, archive) = result?;
    debug!("Write response with file {}", file_name);
    Ok(response::attachment(&file_name, archive))
}

/// Everything between "working directory exists" and "zip is built"
async fn watermark(
    state: &AppState,
    form: &UploadForm,
    work: &WorkDir,
) -> crate::error::Result<(String, Vec<u8>)> {
    let watermark = form.persist(work, WATERMARK_FIELD).await?;
    let container = form.persist(work, CONTAINER_FIELD).await?;

    let transcoded = state
        .transcoder
        .transcode(&container.path, &watermark.path, work)
        .await?;
    Ok((attachment_name(&container.name), transcoded.archive))
}

/// Remove the working directory off the async runtime
async fn release(work: WorkDir) {
    if work.is_kept() {
        debug!("Keeping temp dir {}", work.path().display());
        return;
    }
    if let Err(e) = tokio::task::spawn_blocking(move || drop(work)).await {
        warn!("Failed to clean up working directory: {}", e);
    }
}
