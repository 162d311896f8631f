//! Batch classification. Pure functions over a project snapshot so every
//! rule can be tested without a watcher.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use crate::freshness::{ContentHash, hash_file};
use crate::project::ProjectContext;
use crate::utils::path::normalize_path;

/// Why a batch warrants a reload.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub config: bool,
    pub config_resource: bool,
    pub resource: bool,
    pub extension: bool,
    pub input_removed: bool,
}

impl Classification {
    pub fn reload(&self) -> bool {
        self.config || self.config_resource || self.resource || self.extension || self.input_removed
    }

    /// The project must be re-scanned after acting on this batch.
    pub fn refresh_config(&self) -> bool {
        self.config || self.config_resource || self.input_removed
    }
}

/// Canonical form of an event path. Removed files no longer canonicalize,
/// so their parent is resolved instead.
pub(super) fn normalize_event_path(path: &Path) -> PathBuf {
    if path.exists() {
        return normalize_path(path);
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => normalize_path(parent).join(name),
        _ => path.to_path_buf(),
    }
}

/// Drop paths in hidden top-level entries (scratch dir, VCS, IDE state)
/// and, when it is distinct from the project, in the output directory.
pub(super) fn relevant_paths(ctx: &ProjectContext, paths: &[PathBuf]) -> Vec<PathBuf> {
    let output_dir = ctx.output_dir();
    let mut relevant: Vec<PathBuf> = paths
        .iter()
        .map(|p| normalize_event_path(p))
        .filter(|p| !is_hidden_in(&ctx.dir, p))
        .filter(|p| match &output_dir {
            Some(out) if *out != ctx.dir => !p.starts_with(out),
            _ => true,
        })
        .collect();
    relevant.sort();
    relevant.dedup();
    relevant
}

fn is_hidden_in(project_dir: &Path, path: &Path) -> bool {
    path.strip_prefix(project_dir)
        .ok()
        .and_then(|rel| rel.components().next())
        .is_some_and(|first| first.as_os_str().to_string_lossy().starts_with('.'))
}

/// Existing inputs among `paths` whose content differs from the last render.
pub(super) fn changed_inputs(
    ctx: &ProjectContext,
    paths: &[PathBuf],
    rendered: &FxHashMap<PathBuf, ContentHash>,
) -> Vec<PathBuf> {
    paths
        .iter()
        .filter(|p| ctx.is_input(p) && p.is_file())
        .filter(|p| rendered.get(*p) != Some(&hash_file(p)))
        .cloned()
        .collect()
}

/// Classify a batch that did not go through input rendering.
///
/// `file_resources` are the resources discovered in rendered documents.
pub(super) fn classify(
    ctx: &ProjectContext,
    paths: &[PathBuf],
    file_resources: &[PathBuf],
) -> Classification {
    let lib_dir = ctx.lib_dir().map(|lib| ctx.dir.join(lib));
    let is_resource = |path: &PathBuf| {
        if lib_dir.as_ref().is_some_and(|lib| path.starts_with(lib)) {
            return false;
        }
        ctx.files.resources.contains(path) || file_resources.contains(path)
    };
    let extension_dirs = ctx.extension_dirs();

    Classification {
        config: paths.iter().any(|p| ctx.files.config.contains(p)),
        config_resource: paths.iter().any(|p| ctx.files.config_resources.contains(p)),
        resource: paths.iter().any(is_resource),
        extension: paths
            .iter()
            .any(|p| extension_dirs.iter().any(|dir| p.starts_with(dir))),
        input_removed: ctx.files.input.iter().any(|input| !input.exists()),
    }
}
