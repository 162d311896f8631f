//! The scanned project aggregate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use jwalk::WalkDir;

use super::kind::{ProjectType, project_type};
use super::{SCRATCH_DIR, scan};
use crate::config::ProjectConfig;
use crate::core::BuildSession;
use crate::freeze::FREEZE_DIR;
use crate::render::Format;
use crate::render::resources::resolve_globs;
use crate::utils::path::normalize_path;

/// Directory holding project extensions.
pub const EXTENSIONS_DIR: &str = "_extensions";

/// Classified project files, all absolute and normalized.
#[derive(Debug, Clone, Default)]
pub struct ProjectFiles {
    pub input: Vec<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub config: Vec<PathBuf>,
    pub config_resources: Vec<PathBuf>,
}

/// A project as seen by one render or preview pass.
///
/// Built by scanning the directory and its config; immutable afterwards.
/// Preview replaces it wholesale on refresh (see [`super::ProjectHandle`]).
#[derive(Clone)]
pub struct ProjectContext {
    pub dir: PathBuf,
    pub config: ProjectConfig,
    pub kind: Arc<dyn ProjectType>,
    pub engines: Vec<String>,
    pub files: ProjectFiles,
    output_dir: Option<String>,
    lib_dir: Option<String>,
}

impl std::fmt::Debug for ProjectContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectContext")
            .field("dir", &self.dir)
            .field("kind", &self.kind.name())
            .field("output_dir", &self.output_dir)
            .field("inputs", &self.files.input.len())
            .finish()
    }
}

impl ProjectContext {
    /// Scan the project rooted at `dir`.
    pub fn load(dir: &Path, session: &BuildSession) -> Result<Self> {
        let dir = normalize_path(dir);
        let config = ProjectConfig::load(&dir, session)
            .with_context(|| format!("Failed to load project config in {}", dir.display()))?;
        let kind = project_type(&config.project.kind)?;

        let output_dir = config
            .project
            .output_dir()
            .map(str::to_owned)
            .or_else(|| kind.default_output_dir().map(str::to_owned));
        let lib_dir = config
            .project
            .lib_dir
            .clone()
            .or_else(|| kind.default_lib_dir().map(str::to_owned));

        let mut ctx = Self {
            dir,
            config,
            kind,
            engines: Vec::new(),
            files: ProjectFiles::default(),
            output_dir,
            lib_dir,
        };
        ctx.scan();
        Ok(ctx)
    }

    /// Re-scan with the same configuration.
    fn scan(&mut self) {
        let exclude = self.exclude_dirs();
        let input = scan::scan_inputs(&self.dir, &exclude, &self.config.project.render);
        self.engines = scan::engines_for(&input);

        let resolved = resolve_globs(&self.dir, &self.config.project.resources);
        let resources = resolved
            .include
            .into_iter()
            .filter(|p| !resolved.exclude.contains(p))
            .filter(|p| !exclude.iter().any(|d| p.starts_with(d)))
            .collect();

        self.files = ProjectFiles {
            input,
            resources,
            config: self.config.config_files.iter().map(|p| normalize_path(p)).collect(),
            config_resources: self
                .config
                .config_resources(self.kind.config_resource_ignore_fields()),
        };
    }

    /// Same project, rendering into `output_dir` instead of the configured one.
    pub fn with_output_dir(&self, output_dir: &Path) -> Self {
        let mut ctx = self.clone();
        let rel = output_dir.strip_prefix(&ctx.dir).unwrap_or(output_dir);
        ctx.output_dir = Some(rel.to_string_lossy().into_owned()).filter(|d| !d.is_empty() && d != ".");
        ctx.scan();
        ctx
    }

    /// Project-relative output directory name, if the project has one.
    pub fn output_dir_name(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    /// Absolute output directory, if the project has one.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir.as_ref().map(|d| self.dir.join(d))
    }

    /// Where outputs land: the output dir, or the project dir itself.
    pub fn output_root(&self) -> PathBuf {
        self.output_dir().unwrap_or_else(|| self.dir.clone())
    }

    pub fn lib_dir(&self) -> Option<&str> {
        self.lib_dir.as_deref()
    }

    /// Absolute output directory for `format`, honoring per-format routing.
    pub fn format_output_dir(&self, format: &Format) -> PathBuf {
        let root = self.output_root();
        let sub = self
            .kind
            .format_output_directory(format)
            .or_else(|| format.output_dir.clone());
        match sub {
            Some(sub) if self.output_dir.is_some() => root.join(sub),
            _ => root,
        }
    }

    /// Directories that never contain inputs or resources.
    pub fn exclude_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.dir.join(SCRATCH_DIR), self.dir.join(FREEZE_DIR)];
        if let Some(out) = self.output_dir() {
            dirs.push(out);
        }
        if let Some(lib) = &self.lib_dir {
            dirs.push(self.dir.join(lib));
        }
        dirs
    }

    pub fn formats(&self) -> Vec<Format> {
        self.config.formats()
    }

    /// Path relative to the project directory (unchanged if outside).
    pub fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.dir)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn is_input(&self, path: &Path) -> bool {
        self.files.input.iter().any(|p| p == path)
    }

    /// Project extension directories (currently just `_extensions`).
    pub fn extension_dirs(&self) -> Vec<PathBuf> {
        let dir = self.dir.join(EXTENSIONS_DIR);
        if dir.is_dir() { vec![dir] } else { Vec::new() }
    }

    /// Every file belonging to a loaded extension.
    pub fn extension_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .extension_dirs()
            .iter()
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .skip_hidden(false)
                    .into_iter()
                    .filter_map(Result::ok)
                    .filter(|e| e.file_type().is_file())
                    .map(|e| normalize_path(&e.path()))
            })
            .collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn project(config: &str, files: &[&str]) -> (TempDir, ProjectContext) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_quire.toml"), config).unwrap();
        for f in files {
            let path = dir.path().join(f);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "# x").unwrap();
        }
        let ctx = ProjectContext::load(dir.path(), &BuildSession::new()).unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_website_defaults_and_exclusions() {
        let (_dir, ctx) = project(
            "[project]\ntype = \"website\"\nresources = [\"data/*.csv\"]",
            &["index.qmd", "_site/old.qmd", "site_libs/x.md", "data/a.csv", "data/b.csv"],
        );
        assert_eq!(ctx.output_dir_name(), Some("_site"));
        assert_eq!(ctx.lib_dir(), Some("site_libs"));
        assert_eq!(ctx.files.input, vec![ctx.dir.join("index.qmd")]);
        assert_eq!(ctx.files.resources.len(), 2);
        assert_eq!(ctx.files.config.len(), 1);
        assert_eq!(ctx.engines, vec!["markdown"]);
    }

    #[test]
    fn test_unknown_type_is_fatal() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("_quire.toml"), "[project]\ntype = \"wiki\"").unwrap();
        let err = ProjectContext::load(dir.path(), &BuildSession::new()).unwrap_err();
        assert!(format!("{err:#}").contains("missing project type"));
    }

    #[test]
    fn test_format_output_dir() {
        let (_dir, ctx) = project(
            "[project]\ntype = \"manuscript\"\n[format.html]\n[format.pdf]\n[format.docx]\noutput-dir = \"word\"",
            &["paper.qmd"],
        );
        let out = ctx.output_dir().unwrap();
        let formats = ctx.formats();
        assert_eq!(ctx.format_output_dir(&formats[0]), out);
        assert_eq!(ctx.format_output_dir(&formats[1]), out.join("pdf"));
        // project type routing wins over the format's own setting
        assert_eq!(ctx.format_output_dir(&formats[2]), out.join("docx"));
    }

    #[test]
    fn test_no_output_dir_renders_in_place() {
        let (_dir, ctx) = project("", &["a.qmd"]);
        assert!(ctx.output_dir().is_none());
        assert_eq!(ctx.output_root(), ctx.dir);

        let overridden = ctx.with_output_dir(Path::new("public"));
        assert_eq!(overridden.output_dir(), Some(ctx.dir.join("public")));
    }

    #[test]
    fn test_extension_files() {
        let (_dir, ctx) = project("", &["_extensions/acme/theme/_extension.yml", "a.qmd"]);
        assert_eq!(ctx.extension_dirs().len(), 1);
        assert_eq!(ctx.extension_files().len(), 1);
    }
}
