//! Project discovery and project-level state.
//!
//! - [`context`]: `ProjectContext`, the scanned project aggregate
//! - [`scan`]: input and resource discovery
//! - [`kind`]: project types (`default`, `website`, `book`, `manuscript`)
//! - [`gitignore`]: scratch-dir ignore entry maintenance
//! - [`index`]: cached input → output-name index
//! - [`handle`]: atomically refreshable context for preview

mod context;
pub mod gitignore;
mod handle;
pub mod index;
pub mod kind;
pub mod scan;

pub use context::{ProjectContext, ProjectFiles};
pub use handle::ProjectHandle;
pub use kind::{ProjectOutputFile, ProjectType, Supplement, project_type};

use std::path::{Path, PathBuf};

/// Internal scratch directory name (project root).
pub const SCRATCH_DIR: &str = ".quire";

/// Path inside the project's scratch directory.
pub fn scratch_path(project_dir: &Path, name: impl AsRef<Path>) -> PathBuf {
    project_dir.join(SCRATCH_DIR).join(name)
}
