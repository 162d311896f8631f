//! Path normalization and filesystem helpers.
//!
//! - `normalize_path` - the one place a canonical absolute path is produced
//! - relative / containment helpers used when mapping inputs to outputs
//! - removal helpers that tolerate already-missing paths

use crate::log;
use std::io;
use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to:
/// - Return as-is if already absolute
/// - Join with current directory if relative
///
/// Every comparison between paths from different sources (watcher events,
/// CLI arguments, scanned inputs) goes through this function.
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Render a path with `/` separators (hook env vars, URLs, freeze entries).
pub fn forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove a file or directory tree. A missing path is not an error.
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Like [`remove_if_exists`], but failures are only logged.
pub fn safe_remove_if_exists(path: &Path) {
    if let Err(e) = remove_if_exists(path) {
        log!("warning"; "failed to remove {}: {}", path.display(), e);
    }
}

/// Remove `dir` if it is an empty directory. Returns whether it was removed.
pub fn remove_if_empty_dir(dir: &Path) -> io::Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    if std::fs::read_dir(dir)?.next().is_some() {
        return Ok(false);
    }
    std::fs::remove_dir(dir)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("relative/path/file.txt"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_resolves_dots() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("a")).unwrap();
        let dotted = dir.path().join("a").join("..").join("a");
        assert_eq!(normalize_path(&dotted), normalize_path(&dir.path().join("a")));
    }

    #[test]
    fn test_forward_slashes() {
        assert_eq!(forward_slashes(&Path::new("docs").join("a.qmd")), "docs/a.qmd");
    }

    #[test]
    fn test_remove_if_exists() {
        let dir = TempDir::new().unwrap();
        let tree = dir.path().join("tree");
        fs::create_dir_all(tree.join("nested")).unwrap();
        fs::write(tree.join("nested/f.txt"), "x").unwrap();

        remove_if_exists(&tree).unwrap();
        assert!(!tree.exists());
        // second call is a no-op
        remove_if_exists(&tree).unwrap();
    }

    #[test]
    fn test_remove_if_empty_dir() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("full");
        let empty = dir.path().join("empty");
        fs::create_dir(&full).unwrap();
        fs::create_dir(&empty).unwrap();
        fs::write(full.join("f"), "x").unwrap();

        assert!(!remove_if_empty_dir(&full).unwrap());
        assert!(remove_if_empty_dir(&empty).unwrap());
        assert!(!empty.exists());
        assert!(!remove_if_empty_dir(&empty).unwrap());
    }
}
