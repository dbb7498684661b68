//! Utility functions for local paths and human-readable sizes

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Pick a destination path inside `dir` that does not exist yet
///
/// If `dir/file_name` is free it is returned unchanged, otherwise a numbered
/// suffix is inserted before the extension.
///
/// # Examples
///
/// ```
/// use quark_share_dl::utils::unique_local_path;
/// use std::path::Path;
///
/// let path = unique_local_path(Path::new("/tmp/does-not-exist"), "movie.mkv").unwrap();
/// // If movie.mkv exists, returns movie (1).mkv
/// // If that exists too, returns movie (2).mkv, etc.
/// assert_eq!(path, Path::new("/tmp/does-not-exist/movie.mkv"));
/// ```
pub fn unique_local_path(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let file_name = sanitize_file_name(file_name);
    let candidate = dir.join(&file_name);
    if !candidate.exists() {
        return Ok(candidate);
    }

    let as_path = Path::new(&file_name);
    let stem = as_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file_name);
    let extension = as_path.extension().and_then(|e| e.to_str());

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let new_name = match extension {
            Some(ext) => format!("{} ({}).{}", stem, i, ext),
            None => format!("{} ({})", stem, i),
        };
        let new_path = dir.join(new_name);
        if !new_path.exists() {
            return Ok(new_path);
        }
    }

    Err(Error::LocalIo(format!(
        "could not find a free name for {} after {} attempts",
        file_name, MAX_RENAME_ATTEMPTS
    )))
}

/// Make a remote file name safe to use as a single local path component
///
/// Path separators and characters rejected by common filesystems become `_`.
/// Names that would be empty or refer to the current/parent directory are
/// replaced by `"download"`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format a byte count with binary units, e.g. `1.5 MB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}
