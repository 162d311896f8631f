//! Input and resource discovery.

use std::fs;
use std::path::{Path, PathBuf};

use crate::render::resources::resolve_globs;
use crate::utils::path::normalize_path;

/// Directories never scanned for inputs.
const IGNORED_DIRS: &[&str] = &["node_modules", "renv", "packrat", "venv", "env", ".venv"];

/// Input document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Quarto,
    Markdown,
    RMarkdown,
    Notebook,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "qmd" => Some(Self::Quarto),
            "md" => Some(Self::Markdown),
            "rmd" => Some(Self::RMarkdown),
            "ipynb" => Some(Self::Notebook),
            _ => None,
        }
    }

    /// Execution engine responsible for this kind.
    pub const fn engine(self) -> &'static str {
        match self {
            Self::Quarto | Self::Markdown => "markdown",
            Self::RMarkdown => "knitr",
            Self::Notebook => "jupyter",
        }
    }

    pub const fn is_notebook(self) -> bool {
        matches!(self, Self::Notebook)
    }
}

/// Whether a file name may be a project input at all.
fn is_candidate_name(name: &str) -> bool {
    !name.starts_with('_')
        && !name.starts_with('.')
        && !name.to_ascii_lowercase().starts_with("readme.")
}

fn is_ignored_dir(name: &str) -> bool {
    name.starts_with('_')
        || name.starts_with('.')
        || name.ends_with("_files")
        || IGNORED_DIRS.contains(&name)
}

/// `doc.html.md` next to `doc.qmd` is a kept intermediate, not an input.
fn is_intermediate(path: &Path) -> bool {
    let Some(stem) = path.file_stem().map(Path::new) else {
        return false;
    };
    let is_md = path.extension().and_then(|e| e.to_str()) == Some("md");
    if stem.extension().is_none() || !is_md {
        return false;
    }
    let Some(base) = stem.file_stem() else {
        return false;
    };
    let dir = path.parent().unwrap_or(Path::new(""));
    ["qmd", "rmd", "ipynb", "md"].iter().any(|ext| {
        let mut name = base.to_os_string();
        name.push(".");
        name.push(ext);
        dir.join(name).is_file()
    })
}

/// Whether `path` (absolute) is a renderable input of a project at `root`.
pub fn is_input_file(root: &Path, path: &Path, exclude: &[PathBuf]) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if InputKind::from_path(path).is_none() || !is_candidate_name(name) || is_intermediate(path) {
        return false;
    }
    if exclude.iter().any(|dir| path.starts_with(dir)) {
        return false;
    }
    let Ok(rel) = path.strip_prefix(root) else {
        return false;
    };
    rel.parent()
        .into_iter()
        .flat_map(Path::components)
        .all(|c| c.as_os_str().to_str().is_some_and(|n| !is_ignored_dir(n)))
}

/// Scan `root` for input files, skipping `exclude` directories.
///
/// With `render` globs the result is restricted to matching files.
pub fn scan_inputs(root: &Path, exclude: &[PathBuf], render: &[String]) -> Vec<PathBuf> {
    let mut inputs = Vec::new();
    scan_recursive(root, root, exclude, &mut inputs);

    if !render.is_empty() {
        let allowed = resolve_globs(root, render);
        inputs.retain(|p| allowed.include.contains(p) && !allowed.exclude.contains(p));
    }

    inputs.sort();
    inputs
}

fn scan_recursive(root: &Path, dir: &Path, exclude: &[PathBuf], out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = normalize_path(&entry.path());
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if path.is_dir() {
            if !is_ignored_dir(&name) && !exclude.iter().any(|d| path.starts_with(d)) {
                scan_recursive(root, &path, exclude, out);
            }
        } else if is_input_file(root, &path, exclude) {
            out.push(path);
        }
    }
}

/// Engine names used by `inputs`, deduplicated in first-seen order.
pub fn engines_for(inputs: &[PathBuf]) -> Vec<String> {
    let mut engines: Vec<String> = Vec::new();
    for kind in inputs.iter().filter_map(|p| InputKind::from_path(p)) {
        if !engines.iter().any(|e| e == kind.engine()) {
            engines.push(kind.engine().to_owned());
        }
    }
    engines
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x").unwrap();
    }

    #[test]
    fn test_scan_inputs_skips_ignored() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        for rel in [
            "index.qmd",
            "about.md",
            "analysis.ipynb",
            "README.md",
            "_draft.qmd",
            "notes.txt",
            "node_modules/pkg/readme.md",
            "_site/index.md",
            "posts/intro.rmd",
            "posts/intro_files/inner.md",
            "doc.qmd",
            "doc.html.md",
        ] {
            touch(&root, rel);
        }

        let inputs = scan_inputs(&root, &[], &[]);
        let rel: Vec<_> = inputs
            .iter()
            .map(|p| p.strip_prefix(&root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            rel,
            vec!["about.md", "analysis.ipynb", "doc.qmd", "index.qmd", "posts/intro.rmd"]
        );
    }

    #[test]
    fn test_scan_respects_exclude_and_render() {
        let dir = TempDir::new().unwrap();
        let root = normalize_path(dir.path());
        touch(&root, "a.qmd");
        touch(&root, "b.qmd");
        touch(&root, "out/c.qmd");

        let inputs = scan_inputs(&root, &[root.join("out")], &["*.qmd".into(), "!b.qmd".into()]);
        assert_eq!(inputs, vec![root.join("a.qmd")]);
    }

    #[test]
    fn test_engines() {
        let inputs = vec![
            PathBuf::from("a.qmd"),
            PathBuf::from("b.ipynb"),
            PathBuf::from("c.md"),
            PathBuf::from("d.Rmd"),
        ];
        assert_eq!(engines_for(&inputs), vec!["markdown", "jupyter", "knitr"]);
        assert!(InputKind::from_path(Path::new("x.ipynb")).unwrap().is_notebook());
    }
}
