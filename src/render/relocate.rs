//! Moving engine outputs from the source tree into the output directory.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::RenderResultFile;
use super::engine::RenderedFile;
use super::input_files_dir;
use crate::freeze::{
    FREEZE_DIR, copy_to_project_freezer, prune_project_freezer, prune_project_freezer_dir,
};
use crate::project::ProjectContext;
use crate::utils::path::copy::{copy_minimal, copy_to, move_to};
use crate::utils::path::{remove_if_empty_dir, remove_if_exists, safe_remove_if_exists};
use crate::{debug, log};

/// Final location of one rendered file.
#[derive(Debug)]
pub(super) struct Relocated {
    /// Absolute output path.
    pub file: PathBuf,
    /// Absolute supporting paths in the output tree.
    pub supporting: Vec<PathBuf>,
}

/// Pending supporting-file move or copy.
struct FileOperation {
    src: PathBuf,
    dest: PathBuf,
    copy: bool,
}

impl FileOperation {
    fn perform(&self) -> Result<()> {
        if !self.src.exists() {
            return Ok(());
        }
        remove_if_exists(&self.dest)
            .with_context(|| format!("Failed to replace {}", self.dest.display()))?;
        if self.copy {
            copy_to(&self.src, &self.dest)
        } else {
            move_to(&self.src, &self.dest)?;
            if let Some(parent) = self.src.parent() {
                remove_if_empty_dir(parent)?;
            }
            Ok(())
        }
    }
}

/// Relocate rendered files into their format output directories.
///
/// Each primary output is moved before the next one is touched. Supporting
/// files are moved (or copied when the format keeps intermediates) after
/// all primary outputs, shallowest first so a parent directory never
/// overwrites an already relocated child. Returns the relocations and
/// whether the lib dir must be kept in the source tree.
pub(super) fn relocate_outputs(
    ctx: &ProjectContext,
    rendered: &[RenderedFile],
) -> Result<(Vec<Relocated>, bool)> {
    let lib_dir = ctx.lib_dir().map(|lib| ctx.dir.join(lib));
    let mut keep_libs = false;
    let mut operations = Vec::new();
    let mut relocated = Vec::with_capacity(rendered.len());
    let mut files_dirs = Vec::new();

    for file in rendered {
        let format_dir = ctx.format_output_dir(&file.format);
        let target = format_dir.join(ctx.relative(&file.file));
        move_to(&file.file, &target)
            .with_context(|| format!("Failed to move {} to the output directory", file.file.display()))?;

        let keep = file.format.keep_files();
        keep_libs |= keep;

        let supporting = filter_supporting(&file.supporting, lib_dir.as_deref());
        let mut moved = Vec::with_capacity(supporting.len());
        for src in supporting {
            let dest = format_dir.join(ctx.relative(&src));
            moved.push(dest.clone());
            operations.push(FileOperation { src, dest, copy: keep });
        }

        if !keep {
            let parent = file.input.parent().unwrap_or(&ctx.dir);
            files_dirs.push(parent.join(input_files_dir(&file.input)));
        }

        relocated.push(Relocated {
            file: target,
            supporting: moved,
        });
    }

    operations.sort_by_key(|op| op.src.components().count());
    for op in &operations {
        op.perform()?;
    }
    for dir in files_dirs {
        remove_if_empty_dir(&dir)?;
    }

    Ok((relocated, keep_libs))
}

/// Drop the lib dir, and any path nested inside another supporting path.
fn filter_supporting(supporting: &[PathBuf], lib_dir: Option<&Path>) -> Vec<PathBuf> {
    let candidates: Vec<&PathBuf> = supporting
        .iter()
        .filter(|p| Some(p.as_path()) != lib_dir)
        .collect();
    candidates
        .iter()
        .filter(|file| {
            !candidates
                .iter()
                .any(|dir| file.starts_with(dir) && **file != *dir)
        })
        .map(|p| (*p).clone())
        .collect()
}

/// Freeze the lib dir, then move or merge it into the output directory.
///
/// Partial renders and freezer renders merge per subdirectory so libs of
/// files outside this render survive; full renders replace it wholesale.
pub(super) fn relocate_lib_dir(
    ctx: &ProjectContext,
    output_dir: &Path,
    incremental: bool,
    keep_libs: bool,
) -> Result<()> {
    let Some(lib) = ctx.lib_dir() else {
        return Ok(());
    };
    let src = ctx.dir.join(lib);
    if !src.exists() {
        return Ok(());
    }

    freeze_lib_dir(ctx, lib, true)?;
    if ctx.dir.join(FREEZE_DIR).exists() {
        freeze_lib_dir(ctx, lib, false)?;
    }

    let target = output_dir.join(lib);
    if incremental {
        for entry in fs::read_dir(&src).with_context(|| format!("Failed to read {}", src.display()))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let sub = entry.path();
                copy_minimal(&sub, &target.join(entry.file_name()))?;
                if !keep_libs {
                    safe_remove_if_exists(&sub);
                }
            }
        }
        if !keep_libs {
            safe_remove_if_exists(&src);
        }
    } else {
        remove_if_exists(&target).with_context(|| format!("Failed to replace {}", target.display()))?;
        if keep_libs {
            copy_to(&src, &target)?;
        } else {
            move_to(&src, &target)?;
        }
    }
    debug!("render"; "relocated lib dir {lib}");
    Ok(())
}

fn freeze_lib_dir(ctx: &ProjectContext, lib: &str, hidden: bool) -> Result<()> {
    copy_to_project_freezer(&ctx.dir, Path::new(lib), hidden, false)?;
    prune_project_freezer_dir(&ctx.dir, lib, ctx.kind.format_lib_dirs(), hidden)?;
    prune_project_freezer(&ctx.dir, Some(lib), hidden)?;
    Ok(())
}

/// Copy project and per-file resources into each format output directory.
///
/// `source_outputs` are the rendered files' original locations; a resource
/// that is one of them is skipped so an output is never copied over itself.
pub(super) fn copy_resources(
    ctx: &ProjectContext,
    files: &mut [RenderResultFile],
    source_outputs: &[PathBuf],
) -> Result<()> {
    for file in files.iter_mut() {
        file.resource_files.retain(|r| !source_outputs.contains(r));
    }

    // src -> destinations
    let mut to_copy: BTreeMap<&Path, BTreeSet<PathBuf>> = BTreeMap::new();

    let mut seen_formats = BTreeSet::new();
    for file in files.iter() {
        if !seen_formats.insert(file.format.name.as_str()) {
            continue;
        }
        let format_dir = ctx.format_output_dir(&file.format);
        for resource in &ctx.files.resources {
            to_copy
                .entry(resource.as_path())
                .or_default()
                .insert(format_dir.join(ctx.relative(resource)));
        }
    }
    for file in files.iter() {
        let format_dir = ctx.format_output_dir(&file.format);
        for resource in &file.resource_files {
            to_copy
                .entry(resource.as_path())
                .or_default()
                .insert(format_dir.join(ctx.relative(resource)));
        }
    }

    for (src, destinations) in to_copy {
        for dest in destinations {
            if src.exists() {
                if src.is_file() {
                    copy_minimal(src, &dest)?;
                }
            } else if !dest.exists() {
                log!("warning"; "File '{}' was not found.", src.display());
            }
        }
    }
    Ok(())
}
