//! In-process compositor for tests
//!
//! [`RecordingCompositor`] never shells out. It copies the media file to the
//! output path, appends a marker plus the watermark bytes, and records every
//! call so tests can assert on how often and with what it was invoked.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use super::Compositor;

/// Marker appended between the original bytes and the watermark bytes
pub const WATERMARK_MARKER: &[u8] = b"\n--watermarked-with--\n";

/// One recorded overlay call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub media: PathBuf,
    pub watermark: PathBuf,
    pub output: PathBuf,
}

/// Fake compositor recording its invocations
#[derive(Debug, Default)]
pub struct RecordingCompositor {
    invocations: Mutex<Vec<Invocation>>,
    fail_suffix: Option<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl RecordingCompositor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every overlay whose media path ends with `suffix`
    #[must_use]
    pub fn failing_on(mut self, suffix: &str) -> Self {
        self.fail_suffix = Some(suffix.to_string());
        self
    }

    /// Sleep inside every overlay, so concurrent calls overlap
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// All calls so far, in completion order
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Highest number of overlays that ran at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// What the fake writes for a given original and watermark
    #[must_use]
    pub fn expected_output(original: &[u8], watermark: &[u8]) -> Vec<u8> {
        let mut out = original.to_vec();
        out.extend_from_slice(WATERMARK_MARKER);
        out.extend_from_slice(watermark);
        out
    }

    async fn composite(&self, media: &Path, watermark: &Path, output: &Path) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref suffix) = self.fail_suffix {
            if media.to_string_lossy().ends_with(suffix.as_str()) {
                bail!("refusing to composite {}", media.display());
            }
        }

        let original = tokio::fs::read(media)
            .await
            .with_context(|| format!("read {}", media.display()))?;
        let mark = tokio::fs::read(watermark)
            .await
            .with_context(|| format!("read {}", watermark.display()))?;
        tokio::fs::write(output, Self::expected_output(&original, &mark))
            .await
            .with_context(|| format!("write {}", output.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Compositor for RecordingCompositor {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn overlay(&self, media: &Path, watermark: &Path, output: &Path) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.composite(media, watermark, output).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(Invocation {
                media: media.to_path_buf(),
                watermark: watermark.to_path_buf(),
                output: output.to_path_buf(),
            });
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_marker_and_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("a.png");
        let mark = dir.path().join("logo.png");
        let out = dir.path().join("out.png");
        std::fs::write(&media, b"pixels").unwrap();
        std::fs::write(&mark, b"logo").unwrap();

        let fake = RecordingCompositor::new();
        fake.overlay(&media, &mark, &out).await.unwrap();

        assert_eq!(
            std::fs::read(&out).unwrap(),
            RecordingCompositor::expected_output(b"pixels", b"logo")
        );
        let calls = fake.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].watermark, mark);
        assert_eq!(fake.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn failing_suffix_is_recorded_and_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fake = RecordingCompositor::new().failing_on(".mp4");
        let err = fake
            .overlay(
                &dir.path().join("clip.mp4"),
                &dir.path().join("logo.png"),
                &dir.path().join("out.mp4"),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("clip.mp4"));
        assert_eq!(fake.invocations().len(), 1);
    }
}
