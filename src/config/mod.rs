//! Project configuration management for `_quire.toml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── project    # [project]
//! │   ├── profile    # [profile]
//! │   ├── format     # [format.<name>]
//! │   ├── execute    # [execute]
//! │   ├── engine     # [engine]
//! │   └── serve      # [serve]
//! ├── profile        # Profile and local overlays
//! ├── error          # ConfigError
//! └── mod.rs         # ProjectConfig (this file)
//! ```
//!
//! Loading order: `_quire.toml`, then `_quire-<profile>.toml` for each
//! active profile (first profile wins), then `_quire.toml.local`.

mod error;
pub mod profile;
pub mod section;

pub use error::ConfigError;
pub use section::{
    EngineConfig, ExecuteConfig, ExecuteDir, FormatConfig, FormatsConfig, FreezeMode,
    ProfileConfig, ProjectSectionConfig, ServeConfig,
};

use crate::core::BuildSession;
use crate::log;
use crate::render::Format;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Project config file name.
pub const CONFIG_FILE: &str = "_quire.toml";

/// Local, uncommitted override merged last.
pub const LOCAL_CONFIG_FILE: &str = "_quire.toml.local";

/// Root configuration structure representing `_quire.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Project root directory (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Every config file that contributed to this config (internal use only)
    #[serde(skip)]
    pub config_files: Vec<PathBuf>,

    /// Merged raw table, scanned for config resources (internal use only)
    #[serde(skip)]
    raw: toml::Table,

    pub project: ProjectSectionConfig,
    pub profile: ProfileConfig,
    pub format: FormatsConfig,
    pub execute: ExecuteConfig,
    pub engine: EngineConfig,
    pub serve: ServeConfig,
}

impl ProjectConfig {
    /// Load the configuration of the project rooted at `root`.
    ///
    /// A directory without `_quire.toml` is a default project with no
    /// config files. Profiles are resolved into `session` before overlays
    /// are read.
    pub fn load(root: &Path, session: &BuildSession) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.is_file() {
            session.resolve_profiles(&[], &[]);
            return Ok(Self {
                root: root.to_path_buf(),
                ..Self::default()
            });
        }

        let mut table = profile::read_table(&path)?;

        let profiles: ProfileConfig = match table.get("profile") {
            Some(value) => value
                .clone()
                .try_into()
                .map_err(|err| ConfigError::Toml(path.clone(), err))?,
            None => ProfileConfig::default(),
        };
        session.resolve_profiles(&profiles.default, &profiles.group);

        let mut config_files = vec![path.clone()];
        config_files.extend(profile::apply_overlays(root, &mut table, &session.profiles())?);

        let (mut config, ignored) =
            Self::parse_table(table.clone()).map_err(|err| ConfigError::Toml(path.clone(), err))?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored);
        }

        config.root = root.to_path_buf();
        config.config_files = config_files;
        config.raw = table;
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    pub fn parse_str(content: &str) -> Result<(Self, Vec<String>), toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        let (mut config, ignored) = Self::parse_table(table.clone())?;
        config.raw = table;
        Ok((config, ignored))
    }

    fn parse_table(table: toml::Table) -> Result<(Self, Vec<String>), toml::de::Error> {
        let mut ignored = Vec::new();
        let config = serde_ignored::deserialize(toml::Value::Table(table), |path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String]) {
        log!("warning"; "unknown fields in {} (ignored): {}", CONFIG_FILE, fields.join(", "));
    }

    /// Search upward from `start` for a directory containing `_quire.toml`.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start);
        while let Some(dir) = current {
            if dir.join(CONFIG_FILE).is_file() {
                return Some(dir.to_path_buf());
            }
            current = dir.parent();
        }
        None
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let dirs = [
            ("project.output-dir", self.project.output_dir()),
            ("project.lib-dir", self.project.lib_dir.as_deref()),
        ];
        for (field, dir) in dirs {
            if let Some(dir) = dir
                && !is_contained_relative(Path::new(dir))
            {
                return Err(ConfigError::Validation(format!(
                    "`{field}` must be a relative path inside the project, got `{dir}`"
                )));
            }
        }
        for (name, format) in self.format.iter() {
            if let Some(dir) = format.output_dir.as_deref()
                && !is_contained_relative(Path::new(dir))
            {
                return Err(ConfigError::Validation(format!(
                    "`format.{name}.output-dir` must be a relative path, got `{dir}`"
                )));
            }
        }
        Ok(())
    }

    /// Declared formats in document order; `html` when none are declared.
    pub fn formats(&self) -> Vec<Format> {
        if self.format.is_empty() {
            return vec![Format::new("html", &FormatConfig::default())];
        }
        self.format
            .iter()
            .map(|(name, cfg)| Format::new(name, cfg))
            .collect()
    }

    /// Look up a format by name, falling back to its defaults when undeclared.
    pub fn format(&self, name: &str) -> Format {
        let default = FormatConfig::default();
        Format::new(name, self.format.get(name).unwrap_or(&default))
    }

    /// Every string value in the merged config that names an existing file
    /// relative to the project root.
    pub fn config_resources(&self, ignore_fields: &[&str]) -> Vec<PathBuf> {
        let mut resources = Vec::new();
        collect_resources(&self.root, &self.raw, ignore_fields, &mut resources);
        resources.sort();
        resources.dedup();
        resources
    }
}

fn collect_resources(root: &Path, table: &toml::Table, ignore: &[&str], out: &mut Vec<PathBuf>) {
    for (key, value) in table {
        if !ignore.contains(&key.as_str()) {
            collect_value(root, value, ignore, out);
        }
    }
}

fn collect_value(root: &Path, value: &toml::Value, ignore: &[&str], out: &mut Vec<PathBuf>) {
    match value {
        toml::Value::String(s) if !s.is_empty() => {
            let path = root.join(s);
            if path.is_file() {
                out.push(crate::utils::path::normalize_path(&path));
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                collect_value(root, item, ignore, out);
            }
        }
        toml::Value::Table(table) => collect_resources(root, table, ignore, out),
        _ => {}
    }
}

fn is_contained_relative(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ============================================================================
// test helpers
// ============================================================================

/// Parse a config snippet. Panics on unknown fields (to catch typos in tests).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> ProjectConfig {
    let (parsed, ignored) = ProjectConfig::parse_str(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_invalid_toml() {
        assert!(ProjectConfig::parse_str("[project\ntype = \"website\"").is_err());
    }

    #[test]
    fn test_unknown_fields_detected() {
        let (config, ignored) =
            ProjectConfig::parse_str("[project]\ntype = \"book\"\n[unknown_section]\nfield = 1")
                .unwrap();
        assert_eq!(config.project.kind, "book");
        assert!(ignored.iter().any(|f| f.contains("unknown_section")));
    }

    #[test]
    fn test_default_formats() {
        let formats = test_parse_config("").formats();
        assert_eq!(formats.len(), 1);
        assert_eq!(formats[0].name, "html");
    }

    #[test]
    fn test_validate_rejects_escaping_output_dir() {
        let config = test_parse_config("[project]\noutput-dir = \"../out\"");
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_load_with_profile() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[project]\noutput-dir = \"_site\"\n[profile]\ndefault = \"prod\"",
        )
        .unwrap();
        fs::write(
            profile::profile_file(dir.path(), "prod"),
            "[project]\noutput-dir = \"_prod\"",
        )
        .unwrap();

        let session = BuildSession::new();
        let config = ProjectConfig::load(dir.path(), &session).unwrap();
        assert_eq!(config.project.output_dir(), Some("_prod"));
        assert_eq!(config.config_files.len(), 2);
        assert_eq!(session.profiles(), vec!["prod"]);
    }

    #[test]
    fn test_load_without_config_file() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig::load(dir.path(), &BuildSession::new()).unwrap();
        assert!(config.config_files.is_empty());
        assert_eq!(config.root, dir.path());
    }

    #[test]
    fn test_config_resources() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("theme.css"), "body{}").unwrap();
        fs::write(dir.path().join("nav.yml"), "").unwrap();
        let (mut config, _) = ProjectConfig::parse_str(
            "[format.html]\next = \"html\"\n[site]\ncss = [\"theme.css\", \"missing.css\"]\nnav = \"nav.yml\"",
        )
        .unwrap();
        config.root = dir.path().to_path_buf();

        let all = config.config_resources(&[]);
        assert_eq!(all.len(), 2);
        let filtered = config.config_resources(&["nav"]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].ends_with("theme.css"));
    }

    #[test]
    fn test_find_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "").unwrap();
        fs::create_dir_all(dir.path().join("posts/2024")).unwrap();
        let found = ProjectConfig::find_root(&dir.path().join("posts/2024")).unwrap();
        assert_eq!(found, dir.path());
    }
}
