//! URL to output-tree path resolution.

use std::path::{Path, PathBuf};

/// Resolve a request URL to an existing file under `serve_root`, handling
/// `index.html` for directories.
pub fn resolve_path(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let local = serve_root.join(normalize_url(url)?);

    // canonicalize so symlinks cannot lead outside the root
    let canonical = local.canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }
    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}

/// Where the file for `url` would live under `serve_root`, whether or not
/// it exists yet (outputs rendered on request).
pub fn target_path(url: &str, serve_root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(url)?;
    let local = serve_root.join(&clean);
    if clean.is_empty() || url_path(url).ends_with('/') || local.is_dir() {
        return Some(local.join("index.html"));
    }
    Some(local)
}

fn url_path(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
}

/// Decode, strip query and fragment, trim slashes. `None` for paths that
/// try to climb out of the root.
fn normalize_url(url: &str) -> Option<String> {
    use percent_encoding::percent_decode_str;
    let decoded = percent_decode_str(url_path(url)).decode_utf8().ok()?;
    let path = decoded.trim_matches('/');
    if path.split(['/', '\\']).any(|seg| seg == "..") {
        return None;
    }
    Some(path.to_owned())
}
