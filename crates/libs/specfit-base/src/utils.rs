//! Miscellaneous utilities.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Returns the time as an ISO 8601 timestamp without the timezone and the
/// colon in the time field, suitable for file names.
pub fn iso_timestamp_short(datetime: DateTime<Local>) -> String {
    datetime.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// Resolves a possibly relative path against a base directory.
///
/// Returns the base directory itself if no path is given.
pub fn resolve_path(base: &Path, path: Option<&Path>) -> PathBuf {
    match path {
        None => base.to_path_buf(),
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => base.join(path),
    }
}
