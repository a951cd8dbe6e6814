//! Zip container reading and store-only rebuilding
//!
//! The source container is read fully into memory as a list of
//! [`ArchiveEntry`] values in stored order, up to a cap on the total
//! unpacked size. The rebuilt container is written
//! entry by entry into an in-memory buffer with compression disabled, so
//! already-compressed media is not deflated twice.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Result, WatermarkError};

/// Name suffixes routed through the compositor. Matching is case-sensitive.
pub const MEDIA_EXTENSIONS: [&str; 4] = [".bmp", ".jpg", ".png", ".mp4"];

/// How an entry is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Directory marker, no payload
    Directory,
    /// Image or video, gets a watermark
    Media,
    /// Anything else, copied verbatim
    File,
}

impl EntryKind {
    /// Classify an entry by its directory flag and name
    #[must_use]
    pub fn classify(name: &str, is_dir: bool) -> Self {
        if is_dir {
            Self::Directory
        } else if is_media_file(name) {
            Self::Media
        } else {
            Self::File
        }
    }
}

/// Whether `name` ends with one of [`MEDIA_EXTENSIONS`]
#[must_use]
pub fn is_media_file(name: &str) -> bool {
    MEDIA_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// One named record of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path inside the container, reused verbatim in the output
    pub name: String,
    pub kind: EntryKind,
    pub data: Vec<u8>,
}

/// Read every entry of the zip at `path`, in stored order.
///
/// Fails with [`WatermarkError::ArchiveTooLarge`] once the payloads together
/// exceed `max_unpacked` bytes.
pub fn read_entries(path: &Path, max_unpacked: u64) -> Result<Vec<ArchiveEntry>> {
    let file = File::open(path).map_err(|e| WatermarkError::io(path, e))?;
    let mut archive = ZipArchive::new(file)?;
    let too_large = WatermarkError::ArchiveTooLarge {
        limit: max_unpacked,
    };

    let mut remaining = max_unpacked;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let name = file.name().to_string();
        let kind = EntryKind::classify(&name, file.is_dir());

        let mut data = Vec::new();
        if kind != EntryKind::Directory {
            if file.size() > remaining {
                return Err(too_large);
            }
            // Declared sizes can lie; never inflate past the budget.
            file.by_ref()
                .take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .map_err(|e| WatermarkError::io(path.join(&name), e))?;
            let read = u64::try_from(data.len()).unwrap_or(u64::MAX);
            if read > remaining {
                return Err(too_large);
            }
            remaining -= read;
        }

        entries.push(ArchiveEntry { name, kind, data });
    }
    Ok(entries)
}

/// Builds a store-only zip in memory
pub struct ArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ArchiveBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    fn options(len: usize) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .large_file(u64::try_from(len).unwrap_or(u64::MAX) >= u64::from(u32::MAX))
    }

    /// Add a directory record under `name` (a trailing `/` is kept or added)
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        self.writer.add_directory(name, Self::options(0))?;
        Ok(())
    }

    /// Add a file record; the payload is written in full before returning
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.writer.start_file(name, Self::options(data.len()))?;
        self.writer
            .write_all(data)
            .map_err(|e| WatermarkError::io(name, e))?;
        Ok(())
    }

    /// Write the central directory and return the complete archive bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.writer.finish()?.into_inner())
    }
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}
