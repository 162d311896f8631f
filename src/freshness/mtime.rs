//! Modification-time helpers.
//!
//! Timestamps are cheap but coarse: they are used for large or binary
//! artifacts where reading the content on every request would be too slow.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get the modification time of a file.
///
/// Returns `None` if the file doesn't exist or mtime cannot be read.
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Modification time in milliseconds since the epoch, `0` when unknown.
pub fn mtime_millis(path: &Path) -> u128 {
    get_mtime(path)
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mtime_missing_file() {
        assert!(get_mtime(Path::new("/definitely/not/here")).is_none());
        assert_eq!(mtime_millis(Path::new("/definitely/not/here")), 0);
    }

    #[test]
    fn test_mtime_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"%PDF").unwrap();
        assert!(mtime_millis(&path) > 0);
    }
}
