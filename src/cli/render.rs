//! `quire render`: one render pass from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use super::{RenderArgs, project_root};
use crate::core::BuildSession;
use crate::log;
use crate::project::ProjectContext;
use crate::render::{RenderFlags, RenderOptions, RenderResult, render_project};
use crate::utils::path::forward_slashes;

/// Render the given inputs, or the whole project when none (or only the
/// project directory) are given.
pub fn run_render(args: &RenderArgs, session: Arc<BuildSession>) -> Result<()> {
    let (root, files) = match args.files.as_slice() {
        [] => (project_root(&PathBuf::from("."))?, None),
        [dir] if dir.is_dir() => (project_root(dir)?, None),
        [first, ..] => (project_root(first)?, Some(args.files.clone())),
    };
    let ctx = ProjectContext::load(&root, &session)?;

    let options = RenderOptions {
        use_freezer: args.use_freezer,
        flags: RenderFlags {
            to: args.to.clone(),
            output_dir: args.output_dir.clone(),
            execute_daemon: args.execute_daemon,
            execute_dir: args.execute_dir.clone(),
            clean: args.clean,
            quiet: args.quiet,
        },
        ..Default::default()
    };
    let result = render_project(&ctx, &session, options, files)?;

    if !args.quiet {
        report(&result);
    }
    match result.error {
        Some(error) => Err(error.context("Render failed")),
        None => Ok(()),
    }
}

fn report(result: &RenderResult) {
    for file in result.files.iter().filter(|f| !f.supplemental) {
        log!("render"; "{} -> {}", forward_slashes(&file.input), forward_slashes(&file.file));
    }
    let supplemental = result.files.iter().filter(|f| f.supplemental).count();
    if supplemental > 0 {
        log!("render"; "{} supplemental file(s) updated", supplemental);
    }
}
