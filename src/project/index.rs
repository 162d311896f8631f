//! Cached input → output name index under `.quire/idx`.
//!
//! The preview server uses it to map a requested output file back to the
//! input that produces it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::kind::output_file_name;
use super::{ProjectContext, scratch_path};
use crate::freshness::hash_file;
use crate::render::Format;
use crate::utils::path::{forward_slashes, remove_if_exists};

const INDEX_DIR: &str = "idx";

/// Output file (relative to its format output dir) per format name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTargetIndex {
    /// Hash of the input when the entry was written.
    pub hash: String,
    pub formats: BTreeMap<String, String>,
}

/// Delete the whole index.
pub fn clear_project_index(project_dir: &Path) -> Result<()> {
    let dir = scratch_path(project_dir, INDEX_DIR);
    remove_if_exists(&dir).with_context(|| format!("Failed to remove {}", dir.display()))
}

fn index_file(project_dir: &Path, input_rel: &Path) -> PathBuf {
    let mut name = input_rel.as_os_str().to_os_string();
    name.push(".json");
    scratch_path(project_dir, INDEX_DIR).join(name)
}

/// Index entry for a project-relative input, recomputed when the input
/// changed since it was cached.
pub fn input_target_index(ctx: &ProjectContext, input_rel: &Path) -> Result<InputTargetIndex> {
    let hash = hash_file(&ctx.dir.join(input_rel)).to_hex();
    let path = index_file(&ctx.dir, input_rel);

    if let Ok(json) = fs::read_to_string(&path)
        && let Ok(index) = serde_json::from_str::<InputTargetIndex>(&json)
        && index.hash == hash
        && index.formats.len() == ctx.formats().len()
    {
        return Ok(index);
    }

    let formats = ctx
        .formats()
        .iter()
        .map(|f| (f.name.clone(), forward_slashes(&output_file_name(input_rel, f))))
        .collect();
    let index = InputTargetIndex { hash, formats };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, serde_json::to_string_pretty(&index)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(index)
}

/// Input and format producing `output` (absolute path inside the output tree).
pub fn input_for_output_file(ctx: &ProjectContext, output: &Path) -> Option<(PathBuf, Format)> {
    let formats = ctx.formats();
    for input in &ctx.files.input {
        let input_rel = ctx.relative(input);
        let Ok(index) = input_target_index(ctx, &input_rel) else {
            continue;
        };
        for format in &formats {
            let Some(name) = index.formats.get(&format.name) else {
                continue;
            };
            if ctx.format_output_dir(format).join(name) == output {
                return Some((input.clone(), format.clone()));
            }
        }
    }
    None
}

/// Refresh the entry of the input behind a project-relative output file.
pub fn refresh_for_output(ctx: &ProjectContext, output_rel: &Path) -> Result<()> {
    if let Some((input, _)) = input_for_output_file(ctx, &ctx.dir.join(output_rel)) {
        input_target_index(ctx, &ctx.relative(&input))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BuildSession;
    use tempfile::TempDir;

    #[test]
    fn test_index_roundtrip_and_lookup() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("_quire.toml"),
            "[project]\noutput-dir = \"_site\"\n[format.html]\n[format.pdf]\noutput-dir = \"pdf\"",
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("posts")).unwrap();
        fs::write(dir.path().join("posts/a.qmd"), "# A").unwrap();
        let ctx = ProjectContext::load(dir.path(), &BuildSession::new()).unwrap();

        let index = input_target_index(&ctx, Path::new("posts/a.qmd")).unwrap();
        assert_eq!(index.formats["html"], "posts/a.html");
        assert_eq!(index.formats["pdf"], "posts/a.pdf");
        assert!(index_file(&ctx.dir, Path::new("posts/a.qmd")).exists());

        let out = ctx.dir.join("_site/pdf/posts/a.pdf");
        let (input, format) = input_for_output_file(&ctx, &out).unwrap();
        assert_eq!(input, ctx.dir.join("posts/a.qmd"));
        assert_eq!(format.name, "pdf");
        assert!(input_for_output_file(&ctx, &ctx.dir.join("_site/nope.html")).is_none());

        clear_project_index(&ctx.dir).unwrap();
        assert!(!index_file(&ctx.dir, Path::new("posts/a.qmd")).exists());
    }
}
