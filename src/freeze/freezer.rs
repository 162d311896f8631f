//! Project freezer directories and bulk copies between them and the
//! source tree.

use std::fs;
use std::path::{Path, PathBuf};

use super::{EXECUTE_RESULTS, FREEZE_DIR, FreezeError};
use crate::project::scratch_path;
use crate::utils::path::copy::{copy_minimal, copy_to};
use crate::utils::path::{normalize_path, remove_if_empty_dir, remove_if_exists, safe_remove_if_exists};

/// Resolve (and create) the hidden or visible freezer root.
pub fn project_freezer_dir(project_dir: &Path, hidden: bool) -> Result<PathBuf, FreezeError> {
    let dir = if hidden {
        scratch_path(project_dir, FREEZE_DIR)
    } else {
        project_dir.join(FREEZE_DIR)
    };
    fs::create_dir_all(&dir).map_err(FreezeError::io(&dir))?;
    Ok(normalize_path(&dir))
}

/// Freezer path for a project-relative directory: `_files` is dropped.
pub fn as_freezer_dir(dir: &Path) -> PathBuf {
    match dir
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix("_files"))
    {
        Some(stem) => dir.with_file_name(stem),
        None => dir.to_path_buf(),
    }
}

/// Copy a project-relative directory into the freezer.
///
/// Incremental copies merge `execute-results` entry by entry, so entries
/// of files outside the current render survive.
pub fn copy_to_project_freezer(
    project_dir: &Path,
    file: &Path,
    hidden: bool,
    incremental: bool,
) -> anyhow::Result<()> {
    let freezer = project_freezer_dir(project_dir, hidden)?;
    let src = project_dir.join(file);
    let dest = freezer.join(as_freezer_dir(file));

    if !incremental {
        return copy_minimal(&src, &dest);
    }

    let entries = fs::read_dir(&src).map_err(FreezeError::io(&src))?;
    for entry in entries {
        let entry = entry.map_err(FreezeError::io(&src))?;
        let name = entry.file_name();
        if name == EXECUTE_RESULTS {
            let results = entry.path();
            let dest_results = dest.join(EXECUTE_RESULTS);
            fs::create_dir_all(&dest_results).map_err(FreezeError::io(&dest_results))?;
            for json in fs::read_dir(&results).map_err(FreezeError::io(&results))? {
                let json = json.map_err(FreezeError::io(&results))?;
                if json.path().is_file() {
                    copy_to(&json.path(), &dest_results.join(json.file_name()))?;
                }
            }
        } else {
            copy_minimal(&entry.path(), &dest.join(&name))?;
        }
    }
    Ok(())
}

/// Copy a project-relative directory back out of the freezer, if frozen.
pub fn copy_from_project_freezer(project_dir: &Path, file: &Path, hidden: bool) -> anyhow::Result<()> {
    let freezer = project_freezer_dir(project_dir, hidden)?;
    let src = freezer.join(as_freezer_dir(file));
    if src.exists() {
        copy_minimal(&src, &project_dir.join(file))?;
    }
    Ok(())
}

/// Remove per-format subfolders of `dir` inside the freezer.
pub fn prune_project_freezer_dir(
    project_dir: &Path,
    dir: &str,
    files: &[&str],
    hidden: bool,
) -> Result<(), FreezeError> {
    let freezer = project_freezer_dir(project_dir, hidden)?;
    for file in files {
        // some network drives refuse recursive removal; carry on regardless
        safe_remove_if_exists(&freezer.join(dir).join(file));
    }
    let dir = freezer.join(dir);
    remove_if_empty_dir(&dir).map_err(FreezeError::io(&dir))?;
    Ok(())
}

/// Remove the freezer root when it holds nothing but the lib dir (or is
/// empty when the project has no lib dir).
pub fn prune_project_freezer(
    project_dir: &Path,
    lib_dir: Option<&str>,
    hidden: bool,
) -> Result<(), FreezeError> {
    let freezer = project_freezer_dir(project_dir, hidden)?;
    let Some(lib_dir) = lib_dir else {
        remove_if_empty_dir(&freezer).map_err(FreezeError::io(&freezer))?;
        return Ok(());
    };

    let mut only_lib = true;
    for entry in fs::read_dir(&freezer).map_err(FreezeError::io(&freezer))? {
        let entry = entry.map_err(FreezeError::io(&freezer))?;
        if entry.path().is_file() || entry.file_name() != lib_dir {
            only_lib = false;
            break;
        }
    }
    if only_lib {
        remove_if_exists(&freezer).map_err(FreezeError::io(&freezer))?;
    }
    Ok(())
}

/// Visible-freezer location of a project-relative freeze entry.
pub fn freezer_freeze_file(project_dir: &Path, freeze_file: &Path) -> PathBuf {
    let files_dir = freeze_file
        .parent()
        .and_then(Path::parent)
        .unwrap_or(Path::new(""));
    let name = freeze_file.file_name().unwrap_or_default();
    project_dir
        .join(FREEZE_DIR)
        .join(as_freezer_dir(files_dir))
        .join(EXECUTE_RESULTS)
        .join(name)
}

/// Visible-freezer location of a figures directory.
pub fn freezer_figs_dir(project_dir: &Path, files_dir: &Path, figs_dir: &str) -> PathBuf {
    project_dir
        .join(FREEZE_DIR)
        .join(as_freezer_dir(files_dir))
        .join(figs_dir)
}
