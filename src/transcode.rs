//! Archive transcoder: read container -> watermark media -> rebuild container
//!
//! Every entry is handled independently:
//!
//! - directories are recreated under the working directory's `in/` and `out/`
//! - media entries are written to `in/<name>`, composited into `out/<name>`,
//!   and the result is read back
//! - everything else is copied through byte for byte
//!
//! Media entries run concurrently, at most `max_concurrent` compositor calls
//! at a time, but the output container keeps the input order. The first
//! failing entry aborts the whole transcode.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::fs;
use tracing::{debug, info};

use crate::archive::{self, ArchiveBuilder, ArchiveEntry, EntryKind};
use crate::compositor::Compositor;
use crate::config::DEFAULT_MAX_UNPACKED_BYTES;
use crate::error::{Result, WatermarkError};
use crate::sanitize;
use crate::workdir::WorkDir;

/// Counts of what happened to the entries of one container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    pub directories: usize,
    pub composited: usize,
    pub copied: usize,
}

impl TranscodeStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.directories + self.composited + self.copied
    }
}

/// Result of a successful transcode
#[derive(Debug)]
pub struct Transcoded {
    /// Complete zip bytes
    pub archive: Vec<u8>,
    pub stats: TranscodeStats,
}

/// Output record, produced in input order
enum Processed {
    Directory(String),
    File { name: String, data: Vec<u8> },
}

/// Drives one container through the compositor
#[derive(Clone)]
pub struct Transcoder {
    compositor: Arc<dyn Compositor>,
    max_concurrent: usize,
    max_unpacked: u64,
}

impl Transcoder {
    /// Create a transcoder allowing `max_concurrent` compositor calls at once (minimum 1)
    pub fn new(compositor: Arc<dyn Compositor>, max_concurrent: usize) -> Self {
        Self {
            compositor,
            max_concurrent: max_concurrent.max(1),
            max_unpacked: DEFAULT_MAX_UNPACKED_BYTES,
        }
    }

    /// Cap the total unpacked size of one container
    #[must_use]
    pub fn with_max_unpacked_bytes(mut self, bytes: u64) -> Self {
        self.max_unpacked = bytes;
        self
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Rebuild the container at `container`, watermarking every media entry with `watermark`.
    pub async fn transcode(
        &self,
        container: &Path,
        watermark: &Path,
        work: &WorkDir,
    ) -> Result<Transcoded> {
        let source = container.to_path_buf();
        let limit = self.max_unpacked;
        let entries =
            tokio::task::spawn_blocking(move || archive::read_entries(&source, limit)).await??;
        debug!(
            "Read {} entries from {}",
            entries.len(),
            container.display()
        );

        let planned = plan(entries)?;

        let processed: Vec<Processed> = stream::iter(planned)
            .map(|(entry, path)| self.process_entry(entry, path, watermark, work))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let (archive, stats) = tokio::task::spawn_blocking(move || assemble(processed)).await??;
        info!(
            "Transcoded {} entries ({} composited, {} copied, {} directories)",
            stats.total(),
            stats.composited,
            stats.copied,
            stats.directories
        );
        Ok(Transcoded { archive, stats })
    }

    async fn process_entry(
        &self,
        entry: ArchiveEntry,
        path: Option<PathBuf>,
        watermark: &Path,
        work: &WorkDir,
    ) -> Result<Processed> {
        match (entry.kind, path) {
            (EntryKind::Directory, Some(path)) => {
                for dir in [work.input_path(&path), work.output_path(&path)] {
                    create_dir_all(&dir).await?;
                    debug!("Created dir {}", dir.display());
                }
                Ok(Processed::Directory(entry.name))
            }
            (EntryKind::Media, Some(path)) => {
                let data = self.watermark_entry(&entry, &path, watermark, work).await?;
                Ok(Processed::File {
                    name: entry.name,
                    data,
                })
            }
            _ => Ok(Processed::File {
                name: entry.name,
                data: entry.data,
            }),
        }
    }

    async fn watermark_entry(
        &self,
        entry: &ArchiveEntry,
        path: &Path,
        watermark: &Path,
        work: &WorkDir,
    ) -> Result<Vec<u8>> {
        let input = work.input_path(path);
        let output = work.output_path(path);
        for file in [&input, &output] {
            if let Some(parent) = file.parent() {
                create_dir_all(parent).await?;
            }
        }

        fs::write(&input, &entry.data).await.map_err(|e| {
            debug!("Error write file {}: {}", input.display(), e);
            WatermarkError::io(&input, e)
        })?;

        debug!(
            "Run {} {} {}",
            self.compositor.name(),
            input.display(),
            output.display()
        );
        self.compositor
            .overlay(&input, watermark, &output)
            .await
            .map_err(|err| {
                debug!("Error {} {}: {:#}", self.compositor.name(), entry.name, err);
                WatermarkError::Compositor {
                    entry: entry.name.clone(),
                    message: format!("{err:#}"),
                }
            })?;

        fs::read(&output).await.map_err(|e| {
            debug!("Error read file {}: {}", output.display(), e);
            WatermarkError::io(&output, e)
        })
    }
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("compositor", &self.compositor.name())
            .field("max_concurrent", &self.max_concurrent)
            .field("max_unpacked", &self.max_unpacked)
            .finish()
    }
}

async fn create_dir_all(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await.map_err(|e| {
        debug!("Error create dir {}: {}", dir.display(), e);
        WatermarkError::io(dir, e)
    })
}

/// Validate up front every name that becomes a working path, so a hostile
/// entry rejects the request before any compositor runs. Passthrough files
/// never touch the disk and keep whatever name they have. Two media entries
/// may not share a working path.
fn plan(entries: Vec<ArchiveEntry>) -> Result<Vec<(ArchiveEntry, Option<PathBuf>)>> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|entry| {
            if entry.kind == EntryKind::File {
                return Ok((entry, None));
            }
            let path = sanitize::entry_path(&entry.name)?;
            if entry.kind == EntryKind::Media && !seen.insert(path.clone()) {
                return Err(WatermarkError::UnsafeName {
                    name: entry.name,
                    reason: "collides with another entry",
                });
            }
            Ok((entry, Some(path)))
        })
        .collect()
}

fn assemble(processed: Vec<Processed>) -> Result<(Vec<u8>, TranscodeStats)> {
    let mut builder = ArchiveBuilder::new();
    let mut stats = TranscodeStats::default();
    for record in processed {
        match record {
            Processed::Directory(name) => {
                builder.add_directory(&name)?;
                stats.directories += 1;
            }
            Processed::File { name, data } => {
                builder.add_file(&name, &data)?;
                if archive::is_media_file(&name) {
                    stats.composited += 1;
                } else {
                    stats.copied += 1;
                }
            }
        }
    }
    Ok((builder.finish()?, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::testing::RecordingCompositor;
    use std::io::{Cursor, Read, Write};
    use zip::write::SimpleFileOptions;
    use zip::{ZipArchive, ZipWriter};

    fn write_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let mut zip = ZipWriter::new(std::fs::File::create(path).unwrap());
        let opts = SimpleFileOptions::default();
        for (name, data) in entries {
            match data {
                None => zip.add_directory(*name, opts).unwrap(),
                Some(data) => {
                    zip.start_file(*name, opts).unwrap();
                    zip.write_all(data).unwrap();
                }
            }
        }
        zip.finish().unwrap();
    }

    fn read_back(bytes: Vec<u8>) -> Vec<(String, bool, Vec<u8>)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                file.read_to_end(&mut data).unwrap();
                (file.name().to_string(), file.is_dir(), data)
            })
            .collect()
    }

    struct Fixture {
        _root: tempfile::TempDir,
        work: WorkDir,
        container: PathBuf,
        watermark: PathBuf,
    }

    fn fixture(entries: &[(&str, Option<&[u8]>)]) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let work = WorkDir::create(Some(root.path()), false).unwrap();
        let container = root.path().join("photos.zip");
        let watermark = root.path().join("logo.png");
        write_zip(&container, entries);
        std::fs::write(&watermark, b"LOGO").unwrap();
        Fixture {
            _root: root,
            work,
            container,
            watermark,
        }
    }

    #[tokio::test]
    async fn directory_entries_create_in_and_out_dirs() {
        let fx = fixture(&[("d/", None), ("d/e/", None)]);
        let fake = Arc::new(RecordingCompositor::new());
        let transcoder = Transcoder::new(fake.clone(), 2);

        let result = transcoder
            .transcode(&fx.container, &fx.watermark, &fx.work)
            .await
            .unwrap();

        assert!(fx.work.path().join("in/d/e").is_dir());
        assert!(fx.work.path().join("out/d/e").is_dir());
        assert!(fake.invocations().is_empty());
        assert_eq!(result.stats.directories, 2);

        let out = read_back(result.archive);
        assert_eq!(out[0].0, "d/");
        assert!(out[0].1);
    }

    #[tokio::test]
    async fn media_is_materialized_under_in_and_read_from_out() {
        let fx = fixture(&[("d/a.jpg", Some(b"JPEG"))]);
        let fake = Arc::new(RecordingCompositor::new());
        let transcoder = Transcoder::new(fake.clone(), 1);

        transcoder
            .transcode(&fx.container, &fx.watermark, &fx.work)
            .await
            .unwrap();

        let calls = fake.invocations();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].media, fx.work.path().join("in/d/a.jpg"));
        assert_eq!(calls[0].output, fx.work.path().join("out/d/a.jpg"));
        assert_eq!(calls[0].watermark, fx.watermark);
        assert_eq!(std::fs::read(&calls[0].media).unwrap(), b"JPEG");
    }

    #[tokio::test]
    async fn compositor_failure_aborts_everything() {
        let fx = fixture(&[("a.png", Some(b"ok")), ("b.mp4", Some(b"bad"))]);
        let fake = Arc::new(RecordingCompositor::new().failing_on("b.mp4"));
        let transcoder = Transcoder::new(fake, 1);

        let err = transcoder
            .transcode(&fx.container, &fx.watermark, &fx.work)
            .await
            .unwrap_err();
        match err {
            WatermarkError::Compositor { entry, .. } => assert_eq!(entry, "b.mp4"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn traversal_entry_is_rejected_before_compositing() {
        let fx = fixture(&[("a.png", Some(b"ok")), ("../escape.png", Some(b"x"))]);
        let fake = Arc::new(RecordingCompositor::new());
        let transcoder = Transcoder::new(fake.clone(), 1);

        let err = transcoder
            .transcode(&fx.container, &fx.watermark, &fx.work)
            .await
            .unwrap_err();
        assert!(matches!(err, WatermarkError::UnsafeName { .. }));
        assert!(fake.invocations().is_empty());
    }

    #[tokio::test]
    async fn aliased_entry_names_are_rejected() {
        let fx = fixture(&[("a/b.png", Some(b"1")), ("a/./b.png", Some(b"2"))]);
        let fake = Arc::new(RecordingCompositor::new());

        let err = Transcoder::new(fake.clone(), 2)
            .transcode(&fx.container, &fx.watermark, &fx.work)
            .await
            .unwrap_err();
        assert!(matches!(err, WatermarkError::UnsafeName { .. }));
        assert!(fake.invocations().is_empty());
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let transcoder = Transcoder::new(Arc::new(RecordingCompositor::new()), 0);
        assert_eq!(transcoder.max_concurrent(), 1);
    }
}
