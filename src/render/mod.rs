//! Rendering: formats, engine adapter, resources, hooks, the project
//! orchestrator and the render queue.
//!
//! ```text
//! RenderQueue ──► render_project ──► RenderEngine::render_files
//!                      │                    │
//!                      │                    └─ freeze store (defrost / freeze)
//!                      ├─ hooks (pre/post)
//!                      ├─ relocate (outputs, supporting, lib dir)
//!                      └─ resources (copy to output dir)
//! ```

pub mod engine;
pub mod hooks;
mod project;
pub mod queue;
mod relocate;
pub mod resources;


pub use engine::{CommandEngine, EngineOutput, RenderEngine, RenderedFile};
pub use project::{render_file, render_project, render_project_with};
pub use queue::{RenderObserver, RenderQueue};

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::FormatConfig;

/// Supporting files directory of an input: `<stem>_files`.
pub fn input_files_dir(input: &Path) -> String {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    format!("{stem}_files")
}

// ============================================================================
// Format
// ============================================================================

/// A resolved output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    pub name: String,
    /// Output file extension, without the dot.
    pub ext: String,
    pub keep_md: bool,
    pub keep_tex: bool,
    pub keep_typ: bool,
    /// Format-specific subdirectory of the output directory.
    pub output_dir: Option<String>,
}

impl Format {
    pub fn new(name: &str, config: &FormatConfig) -> Self {
        let ext = config
            .ext
            .clone()
            .unwrap_or_else(|| default_extension(name).to_owned());
        Self {
            name: name.to_owned(),
            ext,
            keep_md: config.keep_md,
            keep_tex: config.keep_tex,
            keep_typ: config.keep_typ,
            output_dir: config.output_dir.clone(),
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self.ext.as_str(), "html" | "htm")
    }

    /// Whether any intermediate is kept, which also keeps supporting files
    /// in the source tree.
    pub fn keep_files(&self) -> bool {
        self.keep_md || self.keep_tex || self.keep_typ
    }

    pub fn is_presentation(&self) -> bool {
        matches!(self.name.as_str(), "revealjs" | "beamer" | "pptx")
    }
}

fn default_extension(name: &str) -> &str {
    match name {
        "html" | "revealjs" | "dashboard" => "html",
        "pdf" | "typst" | "beamer" => "pdf",
        "latex" => "tex",
        "gfm" | "markdown" | "commonmark" => "md",
        other => other,
    }
}

// ============================================================================
// Render inputs
// ============================================================================

/// An input submitted to the engine, with optional explicit formats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderFile {
    /// Absolute, normalized input path.
    pub path: PathBuf,
    pub formats: Option<Vec<String>>,
}

impl RenderFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, formats: None }
    }
}

/// User-facing render flags (mostly CLI).
#[derive(Debug, Clone, Default)]
pub struct RenderFlags {
    /// Render only this format.
    pub to: Option<String>,
    pub output_dir: Option<PathBuf>,
    /// Execution daemon keep-alive; `Some(0)` disables daemons.
    pub execute_daemon: Option<u32>,
    /// Working directory for code execution and the engine command.
    pub execute_dir: Option<PathBuf>,
    /// Remove the output directory before a full render.
    pub clean: bool,
    pub quiet: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Reuse frozen results even where `[execute] freeze` is off.
    pub use_freezer: bool,
    pub flags: RenderFlags,
    /// Render triggered by the preview server: no supplemental files and
    /// less output.
    pub dev_server_reload: bool,
    /// Print per-file progress.
    pub progress: bool,
    /// Inputs that must be executed even when a valid freeze entry exists.
    pub always_execute: Vec<PathBuf>,
}

// ============================================================================
// Render results
// ============================================================================

/// One rendered output, after relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderResultFile {
    /// Project-relative input.
    pub input: PathBuf,
    /// Project-relative final output path.
    pub file: PathBuf,
    pub format: Format,
    /// Project-relative supporting files.
    pub supporting: Vec<PathBuf>,
    /// Absolute resource files referenced by the output.
    pub resource_files: Vec<PathBuf>,
    /// Rendered only as a side effect of another file.
    pub supplemental: bool,
}

/// Outcome of one render pass.
///
/// With `error` set, `files` holds what completed before the failure.
#[derive(Debug, Default)]
pub struct RenderResult {
    pub base_dir: PathBuf,
    /// Project-relative output directory, when the project has one.
    pub output_dir: Option<PathBuf>,
    pub files: Vec<RenderResultFile>,
    pub error: Option<anyhow::Error>,
}

impl RenderResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// First output the user actually asked for.
    pub fn first_primary(&self) -> Option<&RenderResultFile> {
        self.files.iter().find(|f| !f.supplemental)
    }
}

/// Fatal render preconditions.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Render target does not exist: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("{} is not a project directory", .0.display())]
    NotAProject(PathBuf),

    #[error("{script} failed with status {code}")]
    HookFailed { script: String, code: i32 },
}
