//! Project types.
//!
//! Each type customizes a subset of the render pipeline through the
//! [`ProjectType`] trait; every capability has a neutral default.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};

use super::ProjectContext;
use crate::render::resources::front_matter_has_key;
use crate::render::{Format, RenderEngine, RenderFile, RenderOptions};
use crate::{debug, log};

/// Files added to a render as a side effect, plus an optional callback
/// run with the non-supplemental output files once rendering finished.
#[derive(Default)]
pub struct Supplement {
    pub files: Vec<RenderFile>,
    pub on_render_complete: Option<Box<dyn FnOnce(&ProjectContext, &[PathBuf]) + Send>>,
}

/// A final output handed to `post_render`.
#[derive(Debug, Clone)]
pub struct ProjectOutputFile {
    /// Absolute output path.
    pub file: PathBuf,
    pub format: Format,
    pub resources: Vec<PathBuf>,
    pub supporting: Vec<PathBuf>,
}

pub trait ProjectType: Send + Sync {
    fn name(&self) -> &'static str;

    fn default_output_dir(&self) -> Option<&'static str> {
        None
    }

    fn default_lib_dir(&self) -> Option<&'static str> {
        None
    }

    /// Whether `--clean` may delete the output directory.
    fn clean_output_dir(&self) -> bool {
        false
    }

    /// Per-format subfolders of the lib dir, pruned from the freezer.
    fn format_lib_dirs(&self) -> &'static [&'static str] {
        &[]
    }

    /// Config keys never treated as config resources.
    fn config_resource_ignore_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether a partial render must become a full render with the freezer.
    fn incremental_render_all(
        &self,
        _ctx: &ProjectContext,
        _options: &RenderOptions,
        _files: &[PathBuf],
    ) -> bool {
        false
    }

    fn supplement_render(
        &self,
        _ctx: &ProjectContext,
        _files: &[RenderFile],
        _incremental: bool,
    ) -> Supplement {
        Supplement::default()
    }

    fn pre_render(&self, _ctx: &ProjectContext) -> Result<()> {
        Ok(())
    }

    fn post_render(
        &self,
        _ctx: &ProjectContext,
        _incremental: bool,
        _outputs: &[ProjectOutputFile],
    ) -> Result<()> {
        Ok(())
    }

    /// Output subdirectory for a format, relative to the output dir.
    fn format_output_directory(&self, _format: &Format) -> Option<String> {
        None
    }

    /// Replacement engine for this project type.
    fn renderer(&self) -> Option<Arc<dyn RenderEngine>> {
        None
    }
}

/// Resolve a `[project] type` value.
pub fn project_type(name: &str) -> Result<Arc<dyn ProjectType>> {
    Ok(match name {
        "default" | "" => Arc::new(DefaultProject),
        "website" => Arc::new(WebsiteProject),
        "book" => Arc::new(BookProject),
        "manuscript" => Arc::new(ManuscriptProject),
        other => bail!("missing project type `{other}`"),
    })
}

// ============================================================================
// default
// ============================================================================

pub struct DefaultProject;

impl ProjectType for DefaultProject {
    fn name(&self) -> &'static str {
        "default"
    }

    fn clean_output_dir(&self) -> bool {
        true
    }
}

// ============================================================================
// website
// ============================================================================

pub struct WebsiteProject;

/// Front matter key marking a listing page.
const LISTING_KEY: &str = "listing";

impl ProjectType for WebsiteProject {
    fn name(&self) -> &'static str {
        "website"
    }

    fn default_output_dir(&self) -> Option<&'static str> {
        Some("_site")
    }

    fn default_lib_dir(&self) -> Option<&'static str> {
        Some("site_libs")
    }

    fn clean_output_dir(&self) -> bool {
        true
    }

    fn format_lib_dirs(&self) -> &'static [&'static str] {
        &["quire-html", "quire-nav"]
    }

    fn config_resource_ignore_fields(&self) -> &'static [&'static str] {
        &["navbar", "sidebar"]
    }

    /// Listing pages summarize other pages, so they are re-rendered with them.
    fn supplement_render(
        &self,
        ctx: &ProjectContext,
        files: &[RenderFile],
        incremental: bool,
    ) -> Supplement {
        if !incremental {
            return Supplement::default();
        }

        let listings: Vec<RenderFile> = ctx
            .files
            .input
            .iter()
            .filter(|input| !files.iter().any(|f| &f.path == *input))
            .filter(|input| front_matter_has_key(input, LISTING_KEY))
            .map(|input| RenderFile::new(input.clone()))
            .collect();

        if listings.is_empty() {
            return Supplement::default();
        }
        debug!("render"; "adding {} listing page(s)", listings.len());

        Supplement {
            files: listings,
            on_render_complete: Some(Box::new(|ctx: &ProjectContext, outputs: &[PathBuf]| {
                for output in outputs {
                    if let Err(e) = super::index::refresh_for_output(ctx, output) {
                        log!("warning"; "failed to update index for {}: {e:#}", output.display());
                    }
                }
            })),
        }
    }
}

// ============================================================================
// book
// ============================================================================

pub struct BookProject;

impl ProjectType for BookProject {
    fn name(&self) -> &'static str {
        "book"
    }

    fn default_output_dir(&self) -> Option<&'static str> {
        Some("_book")
    }

    fn default_lib_dir(&self) -> Option<&'static str> {
        Some("site_libs")
    }

    fn clean_output_dir(&self) -> bool {
        true
    }

    fn format_lib_dirs(&self) -> &'static [&'static str] {
        &["quire-html", "quire-nav"]
    }

    /// Cross-referenced single-artifact formats need every chapter.
    fn incremental_render_all(
        &self,
        ctx: &ProjectContext,
        options: &RenderOptions,
        _files: &[PathBuf],
    ) -> bool {
        match options.flags.to.as_deref() {
            Some(to) => !ctx.config.format(to).is_html(),
            None => ctx.formats().iter().any(|f| !f.is_html()),
        }
    }
}

// ============================================================================
// manuscript
// ============================================================================

pub struct ManuscriptProject;

impl ProjectType for ManuscriptProject {
    fn name(&self) -> &'static str {
        "manuscript"
    }

    fn default_output_dir(&self) -> Option<&'static str> {
        Some("_manuscript")
    }

    fn clean_output_dir(&self) -> bool {
        true
    }

    fn format_output_directory(&self, format: &Format) -> Option<String> {
        (!format.is_html()).then(|| format.name.clone())
    }
}

/// Relative path of an input's primary output, ignoring format subdirs.
pub fn output_file_name(input_rel: &Path, format: &Format) -> PathBuf {
    input_rel.with_extension(&format.ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatConfig;

    #[test]
    fn test_project_type_lookup() {
        assert_eq!(project_type("website").unwrap().name(), "website");
        assert_eq!(project_type("").unwrap().name(), "default");
        let err = project_type("confluence").err().unwrap();
        assert!(err.to_string().contains("missing project type"));
    }

    #[test]
    fn test_defaults() {
        let site = project_type("website").unwrap();
        assert_eq!(site.default_output_dir(), Some("_site"));
        assert_eq!(site.default_lib_dir(), Some("site_libs"));
        assert!(site.clean_output_dir());
        assert!(project_type("default").unwrap().default_output_dir().is_none());
    }

    #[test]
    fn test_manuscript_routes_non_html() {
        let kind = project_type("manuscript").unwrap();
        let html = Format::new("html", &FormatConfig::default());
        let pdf = Format::new("pdf", &FormatConfig::default());
        assert!(kind.format_output_directory(&html).is_none());
        assert_eq!(kind.format_output_directory(&pdf).as_deref(), Some("pdf"));
    }

    #[test]
    fn test_output_file_name() {
        let pdf = Format::new("pdf", &FormatConfig::default());
        assert_eq!(output_file_name(Path::new("ch/a.qmd"), &pdf), PathBuf::from("ch/a.pdf"));
    }
}
