//! Copy and move helpers for relocating render outputs.

use anyhow::{Context, Result};
use jwalk::WalkDir;
use std::fs;
use std::path::Path;

use super::fs::remove_if_exists;

/// Copy a file or directory tree to `dst`, overwriting existing files.
pub fn copy_to(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir(src, dst, false)
    } else {
        copy_file(src, dst)
    }
}

/// Copy only files that are missing at `dst` or differ from it (size or a
/// newer modification time). Leaves unrelated files in `dst` untouched.
pub fn copy_minimal(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        copy_dir(src, dst, true)
    } else if needs_copy(src, dst) {
        copy_file(src, dst)
    } else {
        Ok(())
    }
}

/// Move a file or directory, replacing whatever is at `dst`.
///
/// Falls back to copy + remove when a rename is not possible (e.g. across
/// devices).
pub fn move_to(src: &Path, dst: &Path) -> Result<()> {
    if src == dst {
        return Ok(());
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    if src.is_dir() && dst.exists() {
        remove_if_exists(dst).with_context(|| format!("Failed to replace {}", dst.display()))?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_to(src, dst)?;
    remove_if_exists(src).with_context(|| format!("Failed to remove {}", src.display()))?;
    Ok(())
}

fn copy_file(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    fs::copy(src, dst)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

fn copy_dir(src: &Path, dst: &Path, minimal: bool) -> Result<()> {
    fs::create_dir_all(dst)
        .with_context(|| format!("Failed to create directory {}", dst.display()))?;

    // sorted for deterministic copy order
    for entry in WalkDir::new(src).sort(true).skip_hidden(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", src.display()))?;
        let path = entry.path();
        let Ok(rel) = path.strip_prefix(src) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create directory {}", target.display()))?;
        } else if !minimal || needs_copy(&path, &target) {
            copy_file(&path, &target)?;
        }
    }
    Ok(())
}

fn needs_copy(src: &Path, dst: &Path) -> bool {
    let (Ok(s), Ok(d)) = (fs::metadata(src), fs::metadata(dst)) else {
        return true;
    };
    if s.len() != d.len() {
        return true;
    }
    match (s.modified(), d.modified()) {
        (Ok(sm), Ok(dm)) => sm > dm,
        _ => true,
    }
}
