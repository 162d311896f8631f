use std::fs;
use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use crate::project::ProjectContext;

/// Above this many top-level directories the project root is watched
/// recursively instead, to stay clear of OS watch limits.
const MAX_TOP_LEVEL_WATCHES: usize = 30;

/// Directories never worth watching (environments, dependency caches).
const SKIPPED_DIRS: &[&str] = &["node_modules", "renv", "packrat", "venv", "env"];

/// Watch-root consistency manager.
///
/// The project root is watched non-recursively and each visible top-level
/// directory recursively, which keeps hidden and environment directories
/// out of the watch set.
pub(super) struct WatchRoots {
    project_dir: PathBuf,
    desired: Vec<(PathBuf, RecursiveMode)>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(ctx: &ProjectContext) -> Self {
        Self {
            project_dir: ctx.dir.clone(),
            desired: compute_roots(&ctx.dir),
            attached: FxHashSet::default(),
        }
    }

    pub(super) fn attach_existing<W: Watcher>(&mut self, watcher: &mut W) -> notify::Result<()> {
        for (path, mode) in &self.desired {
            if !path.exists() {
                continue;
            }
            watcher.watch(path, *mode)?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    /// Watch top-level directories created since the last call and
    /// re-attach roots that were removed and recreated.
    pub(super) fn maintain<W: Watcher>(&mut self, watcher: &mut W, changed: &[PathBuf]) {
        let root_recursive = self
            .desired
            .iter()
            .any(|(p, mode)| *p == self.project_dir && *mode == RecursiveMode::Recursive);
        if !root_recursive {
            for path in changed {
                if path.parent() == Some(self.project_dir.as_path())
                    && path.is_dir()
                    && is_watchable_dir(path)
                    && !self.desired.iter().any(|(p, _)| p == path)
                {
                    self.desired.push((path.clone(), RecursiveMode::Recursive));
                }
            }
        }

        self.attached.retain(|path| path.exists());
        for (path, mode) in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, *mode).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "attached watch: {}", path.display());
            }
        }
    }
}

/// Roots to watch for the project at `project_dir`.
pub(super) fn compute_roots(project_dir: &Path) -> Vec<(PathBuf, RecursiveMode)> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(project_dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
                .map(|e| e.path())
                .filter(|p| is_watchable_dir(p))
                .collect()
        })
        .unwrap_or_default();
    dirs.sort();

    if dirs.len() > MAX_TOP_LEVEL_WATCHES {
        return vec![(project_dir.to_path_buf(), RecursiveMode::Recursive)];
    }
    let mut roots = vec![(project_dir.to_path_buf(), RecursiveMode::NonRecursive)];
    roots.extend(dirs.into_iter().map(|d| (d, RecursiveMode::Recursive)));
    roots
}

fn is_watchable_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    !name.starts_with('.') && !SKIPPED_DIRS.contains(&name)
}
