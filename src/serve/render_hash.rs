//! Re-render avoidance for render-on-request.
//!
//! Each served output is fingerprinted over everything that can change it:
//! the output and input themselves, resources, extension files and the
//! project's config and resource files. Large or binary targets use
//! modification times only; HTML rendered from text inputs hashes the
//! output and input content so a touch without a real change is ignored.

use std::path::{Path, PathBuf};

use dashmap::DashMap;

use crate::freshness::{hash_file, mtime_millis};
use crate::project::ProjectContext;
use crate::project::scan::InputKind;
use crate::render::RenderResult;
use crate::utils::mime;

/// Fingerprint recorded for one output file.
#[derive(Debug, Clone)]
struct Recorded {
    hash: String,
    resources: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RenderHashTracker {
    outputs: DashMap<PathBuf, Recorded>,
}

impl RenderHashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `output` must be rendered again before it is served.
    ///
    /// True when nothing was recorded for it or its fingerprint moved.
    pub fn file_requires_rerender(
        &self,
        output: &Path,
        input: &Path,
        resources: &[PathBuf],
        ctx: &ProjectContext,
    ) -> bool {
        let Some(recorded) = self.outputs.get(output) else {
            return true;
        };
        recorded.hash != render_hash(output, input, resources, ctx)
    }

    /// Resource files recorded with the last render of `output`.
    pub fn resources_for(&self, output: &Path) -> Vec<PathBuf> {
        self.outputs
            .get(output)
            .map(|r| r.resources.clone())
            .unwrap_or_default()
    }

    /// Every resource file recorded for any output.
    pub fn all_resources(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self
            .outputs
            .iter()
            .flat_map(|entry| entry.value().resources.clone())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    /// Record fresh fingerprints for every file of a finished render.
    pub fn on_render_result(&self, result: &RenderResult, ctx: &ProjectContext) {
        if result.error.is_some() {
            return;
        }
        for file in &result.files {
            let output = result.base_dir.join(&file.file);
            let input = result.base_dir.join(&file.input);
            let hash = render_hash(&output, &input, &file.resource_files, ctx);
            self.outputs.insert(
                output,
                Recorded {
                    hash,
                    resources: file.resource_files.clone(),
                },
            );
        }
    }
}

/// Fingerprint of `output` and everything it was rendered from.
pub fn render_hash(output: &Path, input: &Path, resources: &[PathBuf], ctx: &ProjectContext) -> String {
    let mut rest: Vec<PathBuf> = resources.to_vec();
    rest.extend(ctx.extension_files());
    rest.extend(ctx.files.config.iter().cloned());
    rest.extend(ctx.files.config_resources.iter().cloned());
    rest.extend(ctx.files.resources.iter().cloned());

    if uses_timestamps(output, input) {
        let mut stamps = vec![mtime_millis(output).to_string(), mtime_millis(input).to_string()];
        stamps.extend(rest.iter().map(|p| mtime_millis(p).to_string()));
        return stamps.join("");
    }

    let mut hasher = blake3::Hasher::new();
    hasher.update(hash_file(output).as_bytes());
    hasher.update(hash_file(input).as_bytes());
    for path in &rest {
        hasher.update(&mtime_millis(path).to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Notebooks can be huge and non-HTML outputs are binary: stamp, don't read.
fn uses_timestamps(output: &Path, input: &Path) -> bool {
    let notebook = InputKind::from_path(input).is_some_and(InputKind::is_notebook);
    notebook || !mime::is_html(mime::from_path(output))
}
