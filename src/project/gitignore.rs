//! Keeps the scratch directory out of version control.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use super::SCRATCH_DIR;

const GITIGNORE: &str = ".gitignore";

/// Ensure `.gitignore` lists `/.quire/`.
///
/// An existing file gets the entry appended when missing; a git repository
/// without a `.gitignore` gets a new one. Idempotent.
pub fn ensure_gitignore(project_dir: &Path) -> Result<()> {
    let entry = format!("/{SCRATCH_DIR}/");
    let path = project_dir.join(GITIGNORE);

    if path.exists() {
        let content =
            fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let present = content.lines().any(|line| {
            let line = line.trim();
            line == entry || line == entry.trim_end_matches('/') || line == &entry[1..]
        });
        if present {
            return Ok(());
        }
        let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut updated = content;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push_str(eol);
        }
        updated.push_str(&entry);
        updated.push_str(eol);
        fs::write(&path, updated).with_context(|| format!("Failed to write {}", path.display()))?;
    } else if project_dir.join(".git").exists() {
        fs::write(&path, format!("{entry}\n"))
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
