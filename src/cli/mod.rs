//! Command-line interface module.

mod args;
pub mod preview;
pub mod render;

pub use args::{Cli, Commands, PreviewArgs, RenderArgs};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ProjectConfig;
use crate::project::scan::InputKind;
use crate::render::RenderError;
use crate::utils::path::normalize_path;

/// Project directory for `path`: the nearest enclosing directory with a
/// config file, or the directory itself (a file's parent) without one.
pub fn project_root(path: &Path) -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let path = normalize_path(&cwd.join(path));
    if !path.exists() {
        return Err(RenderError::TargetNotFound(path).into());
    }
    let start = if path.is_dir() {
        path.clone()
    } else {
        path.parent().map_or_else(|| cwd.clone(), Path::to_path_buf)
    };
    if let Some(root) = ProjectConfig::find_root(&start) {
        return Ok(root);
    }
    if path.is_file() && InputKind::from_path(&path).is_none() {
        return Err(RenderError::NotAProject(path).into());
    }
    Ok(start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_project_root() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::write(root.join("_quire.toml"), "").unwrap();
        fs::create_dir_all(root.join("posts/2024")).unwrap();
        fs::write(root.join("posts/2024/a.qmd"), "# A").unwrap();
        fs::write(root.join("posts/notes.txt"), "x").unwrap();

        assert_eq!(project_root(&root.join("posts/2024/a.qmd")).unwrap(), root);
        assert_eq!(project_root(&root.join("posts")).unwrap(), root);
        assert_eq!(project_root(&root.join("posts/notes.txt")).unwrap(), root);
        assert!(project_root(&root.join("missing.qmd")).is_err());
    }

    #[test]
    fn test_single_file_outside_project() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        fs::write(root.join("report.qmd"), "# R").unwrap();
        fs::write(root.join("report.txt"), "r").unwrap();

        assert_eq!(project_root(&root.join("report.qmd")).unwrap(), root);
        let err = project_root(&root.join("report.txt")).unwrap_err();
        assert!(err.to_string().contains("not a project directory"));
    }
}
