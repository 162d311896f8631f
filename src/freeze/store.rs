//! Freezing and defrosting individual execute results.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::{
    EXECUTE_RESULTS, ExecuteResult, FreezeError, IncludeSource, LEGACY_EXECUTE_RESULTS,
};
use crate::freshness::hash_text_lf;
use crate::render::input_files_dir;
use crate::utils::path::{normalize_path, remove_if_empty_dir, remove_if_exists};
use crate::{debug, log};

#[derive(Serialize, Deserialize)]
struct FreezeEntry {
    hash: String,
    result: ExecuteResult,
}

/// Scratch directory for files materialized from freeze entries.
///
/// Removed when dropped, so it must outlive the render that uses it.
pub struct TempContext {
    dir: tempfile::TempDir,
    counter: AtomicUsize,
}

impl TempContext {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            dir: tempfile::Builder::new().prefix("quire-").tempdir()?,
            counter: AtomicUsize::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a fresh, unused file name inside the context.
    pub fn create_file(&self, suffix: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.path().join(format!("file-{n}{suffix}"))
    }
}

/// Location of the freeze entry for rendering `input` to `output`.
pub fn freeze_result_file(input: &Path, output: &Path, ensure_dir: bool) -> Result<PathBuf, FreezeError> {
    let parent = input.parent().unwrap_or(Path::new(""));
    let freeze_dir = parent.join(input_files_dir(input)).join(EXECUTE_RESULTS);
    if ensure_dir {
        fs::create_dir_all(&freeze_dir).map_err(FreezeError::io(&freeze_dir))?;
    }
    let ext = output
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(freeze_dir.join(format!("{ext}.json")))
}

/// Persist `result` as the freeze entry for `(input, output)`.
///
/// Includes are inlined as LF text and absolute supporting paths are made
/// relative to the input's directory, so the entry is self-contained.
/// The caller's result is not modified. Returns the entry path.
pub fn freeze_execute_result(
    input: &Path,
    output: &Path,
    result: &ExecuteResult,
) -> Result<PathBuf, FreezeError> {
    let mut result = result.clone();

    if let Some(includes) = result.includes.as_mut() {
        for list in includes.all_mut() {
            for include in list.iter_mut() {
                if let IncludeSource::File(path) = include {
                    let text = fs::read_to_string(&*path).map_err(FreezeError::io(&*path))?;
                    *include = IncludeSource::Text(text.replace("\r\n", "\n"));
                }
            }
        }
    }

    let raw_dir = input.parent().unwrap_or(Path::new("."));
    let input_dir = normalize_path(raw_dir);
    for file in &mut result.supporting {
        if !file.is_absolute() {
            continue;
        }
        let rel = file
            .strip_prefix(&input_dir)
            .or_else(|_| file.strip_prefix(raw_dir))
            .map(Path::to_path_buf);
        if let Ok(rel) = rel {
            *file = rel;
        }
    }

    let hash = input_hash(input)?;
    let path = freeze_result_file(input, output, true)?;
    let entry = FreezeEntry { hash, result };
    let json = serde_json::to_string_pretty(&entry).map_err(|source| FreezeError::Json {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json).map_err(FreezeError::io(&path))?;

    debug!("freeze"; "froze {}", path.display());
    Ok(path)
}

/// Restore the frozen result for `(source, output)`.
///
/// Returns `None` when there is no entry, the entry is stale (hash
/// mismatch without `force`), or the entry cannot be parsed. Inlined
/// includes are written to files inside `temp`.
pub fn defrost_execute_result(
    source: &Path,
    output: &Path,
    temp: &TempContext,
    force: bool,
) -> Result<Option<ExecuteResult>, FreezeError> {
    let path = freeze_result_file(source, output, false)?;
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path).map_err(FreezeError::io(&path))?;
    let entry: FreezeEntry = match serde_json::from_str(&contents) {
        Ok(entry) => entry,
        Err(_) => {
            if is_merge_conflict(&contents) {
                log!("warning"; "error parsing {}; it looks possibly like a git merge conflict", path.display());
            } else {
                log!("warning"; "error parsing {}; it may be corrupt", path.display());
            }
            return Ok(None);
        }
    };

    if !force && entry.hash != input_hash(source)? {
        debug!("freeze"; "stale entry {}", path.display());
        return Ok(None);
    }

    let mut result = entry.result;
    let source_dir = normalize_path(source.parent().unwrap_or(Path::new(".")));
    for file in &mut result.supporting {
        *file = source_dir.join(&*file);
    }

    if let Some(includes) = result.includes.as_mut() {
        for list in includes.all_mut() {
            for include in list.iter_mut() {
                if let IncludeSource::Text(text) = include {
                    let file = temp.create_file(".txt");
                    fs::write(&file, to_native_eol(text)).map_err(FreezeError::io(&file))?;
                    *include = IncludeSource::File(file);
                }
            }
        }
    }

    Ok(Some(result))
}

/// Delete current and legacy freeze results under `files_dir`, then the
/// directory itself if nothing else is left.
pub fn remove_freeze_results(files_dir: &Path) -> Result<(), FreezeError> {
    for name in [EXECUTE_RESULTS, LEGACY_EXECUTE_RESULTS] {
        let dir = files_dir.join(name);
        remove_if_exists(&dir).map_err(FreezeError::io(&dir))?;
    }
    remove_if_empty_dir(files_dir).map_err(FreezeError::io(files_dir))?;
    Ok(())
}

fn input_hash(input: &Path) -> Result<String, FreezeError> {
    let text = fs::read_to_string(input).map_err(FreezeError::io(input))?;
    Ok(hash_text_lf(&text).to_hex())
}

fn is_merge_conflict(contents: &str) -> bool {
    contents.contains("<<<<<<<") && contents.contains("=======") && contents.contains(">>>>>>>")
}

#[cfg(windows)]
fn to_native_eol(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\n', "\r\n")
}

#[cfg(not(windows))]
fn to_native_eol(text: &str) -> String {
    text.to_owned()
}
