//! Name sanitization for archive entries and uploaded files
//!
//! Archive entry names and multipart filenames come straight from the
//! client. Before either is joined onto the working directory it is turned
//! into a relative path made only of normal components, so nothing can
//! escape the directory it is joined to.

use std::path::PathBuf;

use crate::error::{Result, WatermarkError};

/// Turn an archive entry name into a relative path safe to join onto a base.
///
/// Both `/` and `\` separate components. Empty and `.` components are
/// dropped. Absolute names, drive prefixes, `..` and NUL bytes are rejected
/// rather than resolved.
pub fn entry_path(name: &str) -> Result<PathBuf> {
    let reject = |reason| WatermarkError::UnsafeName {
        name: name.to_string(),
        reason,
    };

    if name.contains('\0') {
        return Err(reject("contains NUL byte"));
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return Err(reject("absolute path"));
    }

    let mut path = PathBuf::new();
    for (index, part) in name.split(['/', '\\']).enumerate() {
        match part {
            "" | "." => {}
            ".." => return Err(reject("parent directory component")),
            // "C:" and friends
            p if index == 0 && p.len() == 2 && p.ends_with(':') => {
                return Err(reject("drive prefix"));
            }
            p => path.push(p),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(reject("empty after normalization"));
    }
    Ok(path)
}

/// Reduce an uploaded filename to its last component.
///
/// Browsers send bare names, but nothing stops a client from sending
/// `../../x.zip`. Returns `None` when nothing usable is left.
pub fn upload_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next()?.trim();
    match last {
        "" | "." | ".." => None,
        s if s.contains('\0') => None,
        s => Some(s.to_string()),
    }
}
