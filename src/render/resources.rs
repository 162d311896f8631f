//! Resource discovery: globs, front matter and links in document bodies.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use percent_encoding::percent_decode_str;
use regex::Regex;

use crate::project::scan::InputKind;
use crate::utils::path::normalize_path;

/// Glob expansion result; both lists are absolute and normalized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedResources {
    pub include: Vec<PathBuf>,
    pub exclude: Vec<PathBuf>,
}

impl ResolvedResources {
    /// Included files that are not excluded.
    pub fn files(&self) -> Vec<PathBuf> {
        self.include
            .iter()
            .filter(|p| !self.exclude.contains(p))
            .cloned()
            .collect()
    }
}

/// A document split into front matter and body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedMarkdown {
    pub yaml: Option<String>,
    pub markdown: String,
    /// Body contains citation or cross-reference syntax.
    pub contains_refs: bool,
}

pub trait ResourceResolver: Send + Sync {
    fn partitioned_markdown(&self, input: &Path) -> Result<PartitionedMarkdown>;

    fn resolve_file_resources(
        &self,
        root_dir: &Path,
        file_dir: &Path,
        exclude_dirs: &[PathBuf],
        markdown: &str,
        globs: &[String],
    ) -> ResolvedResources;
}

/// Front matter `resources:` globs plus relative links that exist on disk.
pub struct DefaultResourceResolver;

impl ResourceResolver for DefaultResourceResolver {
    fn partitioned_markdown(&self, input: &Path) -> Result<PartitionedMarkdown> {
        let text = fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        Ok(partition_markdown(&text))
    }

    fn resolve_file_resources(
        &self,
        root_dir: &Path,
        file_dir: &Path,
        exclude_dirs: &[PathBuf],
        markdown: &str,
        globs: &[String],
    ) -> ResolvedResources {
        let mut resolved = resolve_globs(file_dir, globs);
        for link in discover_links(markdown) {
            let path = if let Some(rooted) = link.strip_prefix('/') {
                root_dir.join(rooted)
            } else {
                file_dir.join(&link)
            };
            if path.is_file() && InputKind::from_path(&path).is_none() {
                resolved.include.push(normalize_path(&path));
            }
        }
        resolved
            .include
            .retain(|p| !exclude_dirs.iter().any(|d| p.starts_with(d)));
        resolved.include.sort();
        resolved.include.dedup();
        resolved
    }
}

/// Resources of `input` per front matter and links.
pub fn file_resources(
    resolver: &dyn ResourceResolver,
    root_dir: &Path,
    input: &Path,
    exclude_dirs: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    let partitioned = resolver.partitioned_markdown(input)?;
    let globs = partitioned
        .yaml
        .as_deref()
        .map(front_matter_list("resources"))
        .unwrap_or_default();
    let file_dir = input.parent().unwrap_or(root_dir);
    let resolved =
        resolver.resolve_file_resources(root_dir, file_dir, exclude_dirs, &partitioned.markdown, &globs);
    Ok(resolved.files())
}

// ============================================================================
// Globs
// ============================================================================

/// Expand `globs` relative to `root`. A leading `!` makes an exclude glob;
/// a glob naming a directory includes every file below it.
pub fn resolve_globs(root: &Path, globs: &[String]) -> ResolvedResources {
    let mut resolved = ResolvedResources::default();
    for raw in globs {
        let (pattern, exclude) = match raw.strip_prefix('!') {
            Some(rest) => (rest, true),
            None => (raw.as_str(), false),
        };
        let files = expand_glob(root, pattern);
        if exclude {
            resolved.exclude.extend(files);
        } else {
            resolved.include.extend(files);
        }
    }
    for list in [&mut resolved.include, &mut resolved.exclude] {
        list.sort();
        list.dedup();
    }
    resolved
}

fn expand_glob(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let pattern = pattern.trim_start_matches("./");
    if pattern.is_empty() {
        return Vec::new();
    }
    let base = glob::Pattern::escape(&root.to_string_lossy());
    let mut full = format!("{base}/{pattern}");
    if root.join(pattern).is_dir() {
        full.push_str("/**/*");
    }

    let Ok(paths) = glob::glob(&full) else {
        crate::log!("warning"; "invalid glob `{pattern}`");
        return Vec::new();
    };
    paths
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .map(|p| normalize_path(&p))
        .collect()
}

// ============================================================================
// Front matter
// ============================================================================

/// Split `---` fenced YAML front matter from the body.
pub fn partition_markdown(text: &str) -> PartitionedMarkdown {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (yaml, markdown) = split_front_matter(text);
    PartitionedMarkdown {
        yaml: yaml.map(str::to_owned),
        contains_refs: markdown.contains("[@") || REF_RE.is_match(markdown),
        markdown: markdown.to_owned(),
    }
}

fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return (Some(&rest[..offset]), &rest[offset + line.len()..]);
        }
        offset += line.len();
    }
    (None, text)
}

/// Whether the input's front matter has a top-level `key`.
pub fn front_matter_has_key(input: &Path, key: &str) -> bool {
    let Ok(text) = fs::read_to_string(input) else {
        return false;
    };
    partition_markdown(&text)
        .yaml
        .is_some_and(|yaml| top_level_value(&yaml, key).is_some())
}

/// Top-level `key:` entry: the inline value and the indented block below it.
fn top_level_value<'a>(yaml: &'a str, key: &str) -> Option<(&'a str, Vec<&'a str>)> {
    let mut lines = yaml.lines().peekable();
    while let Some(line) = lines.next() {
        let Some(value) = line.strip_prefix(key).and_then(|r| r.strip_prefix(':')) else {
            continue;
        };
        let mut block = Vec::new();
        while let Some(next) = lines.peek() {
            if next.starts_with(' ') || next.starts_with('\t') || next.starts_with('-') {
                block.push(*next);
                lines.next();
            } else {
                break;
            }
        }
        return Some((value.trim(), block));
    }
    None
}

/// Read a top-level string or string list from front matter.
fn front_matter_list(key: &str) -> impl Fn(&str) -> Vec<String> + '_ {
    move |yaml: &str| {
        let Some((inline, block)) = top_level_value(yaml, key) else {
            return Vec::new();
        };
        if let Some(items) = inline.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            return items.split(',').map(unquote).filter(|s| !s.is_empty()).collect();
        }
        if !inline.is_empty() {
            return vec![unquote(inline)];
        }
        block
            .iter()
            .filter_map(|line| line.trim().strip_prefix('-'))
            .map(unquote)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

fn unquote(s: &str) -> String {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| s.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')))
        .unwrap_or(s)
        .to_owned()
}

// ============================================================================
// Links
// ============================================================================

#[allow(clippy::unwrap_used)]
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\]\([ \t]*<?([^) \t\n>]+)>?(?:[ \t]+"[^"]*")?[ \t]*\)|src[ \t]*=[ \t]*"([^"]+)""#).unwrap());

#[allow(clippy::unwrap_used)]
static REF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@(fig|tbl|sec|eq)-[A-Za-z0-9_-]+").unwrap());

/// Local link targets in a markdown body, decoded and without fragments.
fn discover_links(markdown: &str) -> Vec<String> {
    LINK_RE
        .captures_iter(markdown)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str())
        .filter(|target| is_local(target))
        .map(|target| {
            let end = target.find(['#', '?']).unwrap_or(target.len());
            percent_decode_str(&target[..end]).decode_utf8_lossy().into_owned()
        })
        .filter(|target| !target.is_empty())
        .collect()
}

fn is_local(target: &str) -> bool {
    !(target.contains("://")
        || target.starts_with('#')
        || target.starts_with("//")
        || target.starts_with("mailto:")
        || target.starts_with("data:"))
}
