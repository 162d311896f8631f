//! Freeze store: persisted execution results keyed by source content hash.
//!
//! A freeze entry lives next to its input while rendering
//! (`<stem>_files/execute-results/<ext>.json`) and is copied into a
//! project freezer afterwards:
//!
//! - hidden freezer `.quire/_freeze/` always receives entries
//! - visible freezer `_freeze/` is the user-facing, committable copy
//!
//! Entries are `{hash, result}` where `hash` is the blake3 hash of the
//! input's LF-normalized text.

mod freezer;
mod store;


pub use freezer::{
    as_freezer_dir, copy_from_project_freezer, copy_to_project_freezer, freezer_figs_dir,
    freezer_freeze_file, project_freezer_dir, prune_project_freezer, prune_project_freezer_dir,
};
pub use store::{
    TempContext, defrost_execute_result, freeze_execute_result, freeze_result_file,
    remove_freeze_results,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Visible freezer directory name (project root).
pub const FREEZE_DIR: &str = "_freeze";

/// Subdirectory of a files dir holding freeze entries.
pub const EXECUTE_RESULTS: &str = "execute-results";

/// Older name of [`EXECUTE_RESULTS`], still cleaned up.
pub const LEGACY_EXECUTE_RESULTS: &str = "execute";

/// Header/body include, either a file on disk or inlined text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncludeSource {
    File(PathBuf),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PandocIncludes {
    pub include_in_header: Vec<IncludeSource>,
    pub include_before_body: Vec<IncludeSource>,
    pub include_after_body: Vec<IncludeSource>,
}

impl PandocIncludes {
    pub(crate) fn all_mut(&mut self) -> [&mut Vec<IncludeSource>; 3] {
        [
            &mut self.include_in_header,
            &mut self.include_before_body,
            &mut self.include_after_body,
        ]
    }
}

/// Result of executing a document's code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecuteResult {
    /// Markdown with computational output in place of code.
    pub markdown: String,
    /// Supporting files produced by execution (e.g. figure directories).
    pub supporting: Vec<PathBuf>,
    pub filters: Vec<String>,
    pub includes: Option<PandocIncludes>,
    pub engine: Option<String>,
    /// Whether the output needs engine post-processing.
    pub post_process: bool,
}

#[derive(Debug, Error)]
pub enum FreezeError {
    #[error("freeze I/O error on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize freeze entry `{path}`")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl FreezeError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
