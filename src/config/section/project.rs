//! `[project]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [project]
//! type = "website"
//! output-dir = "_site"
//! resources = ["data/*.csv", "!data/secret.csv"]
//! pre-render = "python prep.py"
//! post-render = ["echo done"]
//! execute-dir = "project"
//! ```

use serde::{Deserialize, Serialize};

use super::one_or_many;

/// Working directory for code execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecuteDir {
    /// The input file's directory.
    #[default]
    File,
    /// The project root.
    Project,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProjectSectionConfig {
    /// Project type: `default`, `website`, `book` or `manuscript`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Output directory. `None` (or `"."`) renders in place.
    pub output_dir: Option<String>,

    /// Shared library directory for rendering support assets.
    pub lib_dir: Option<String>,

    /// Restrict inputs to these globs.
    #[serde(deserialize_with = "one_or_many")]
    pub render: Vec<String>,

    /// Project resources copied to the output directory. `!` excludes.
    #[serde(deserialize_with = "one_or_many")]
    pub resources: Vec<String>,

    #[serde(deserialize_with = "one_or_many")]
    pub pre_render: Vec<String>,

    #[serde(deserialize_with = "one_or_many")]
    pub post_render: Vec<String>,

    pub execute_dir: ExecuteDir,

    /// Run post-render hooks for incremental renders too.
    pub always_run_hooks: bool,
}

impl Default for ProjectSectionConfig {
    fn default() -> Self {
        Self {
            kind: "default".to_string(),
            output_dir: None,
            lib_dir: None,
            render: Vec::new(),
            resources: Vec::new(),
            pre_render: Vec::new(),
            post_render: Vec::new(),
            execute_dir: ExecuteDir::File,
            always_run_hooks: true,
        }
    }
}

impl ProjectSectionConfig {
    /// Declared output directory, with `"."` and `""` meaning none.
    pub fn output_dir(&self) -> Option<&str> {
        self.output_dir
            .as_deref()
            .map(|d| d.trim_end_matches('/'))
            .filter(|d| !d.is_empty() && *d != ".")
    }
}
