//! Project render orchestration.
//!
//! Plans the render list, runs hooks, drives the engine and relocates its
//! outputs into the project's output directory. Callers serialize passes
//! through [`super::RenderQueue`]; nothing here is safe to run twice at
//! once against the same project.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::engine::{CommandEngine, RenderEngine, RenderedFile};
use super::hooks::{
    INPUT_FILES_ENV, OUTPUT_DIR_ENV, OUTPUT_FILES_ENV, RENDER_ALL_ENV, files_env_value, run_hooks,
};
use super::relocate::{copy_resources, relocate_lib_dir, relocate_outputs};
use super::resources::{DefaultResourceResolver, ResourceResolver, file_resources};
use super::{RenderError, RenderFile, RenderOptions, RenderResult, RenderResultFile};
use crate::config::ExecuteDir;
use crate::core::BuildSession;
use crate::project::gitignore::ensure_gitignore;
use crate::project::index::clear_project_index;
use crate::project::{ProjectContext, ProjectOutputFile, Supplement};
use crate::utils::path::{normalize_path, remove_if_exists};
use crate::{debug, log};

/// Files above this count render with execution daemons disabled.
const DAEMON_FILE_LIMIT: usize = 3;

/// Render `files` (or the whole project) with the project's engine.
pub fn render_project(
    ctx: &ProjectContext,
    session: &BuildSession,
    options: RenderOptions,
    files: Option<Vec<PathBuf>>,
) -> Result<RenderResult> {
    match ctx.kind.renderer() {
        Some(engine) => render_project_with(ctx, session, options, files, engine.as_ref()),
        None => render_project_with(ctx, session, options, files, &CommandEngine),
    }
}

/// Render a single input of the project.
pub fn render_file(
    ctx: &ProjectContext,
    session: &BuildSession,
    file: PathBuf,
    options: RenderOptions,
) -> Result<RenderResult> {
    render_project(ctx, session, options, Some(vec![file]))
}

/// [`render_project`] with an explicit engine.
///
/// Precondition failures (missing targets, failing hooks) are errors.
/// Engine failures land in [`RenderResult::error`] after the files that
/// did render have been relocated.
pub fn render_project_with(
    ctx: &ProjectContext,
    session: &BuildSession,
    mut options: RenderOptions,
    files: Option<Vec<PathBuf>>,
    engine: &dyn RenderEngine,
) -> Result<RenderResult> {
    let ctx: Cow<'_, ProjectContext> = match &options.flags.output_dir {
        Some(dir) => Cow::Owned(ctx.with_output_dir(dir)),
        None => Cow::Borrowed(ctx),
    };
    let ctx: &ProjectContext = &ctx;

    let incremental = files.is_some();
    let mut files = files.map(|f| normalize_files(&f)).transpose()?;

    // partial renders reflect live edits, never a stale freeze entry
    if let Some(list) = &files
        && !options.use_freezer
    {
        options.always_execute = list.clone();
        if ctx.kind.incremental_render_all(ctx, &options, list) {
            debug!("render"; "{} project needs a full render", ctx.kind.name());
            files = Some(ctx.files.input.clone());
            options.use_freezer = true;
        }
    }

    let render_all = files
        .as_ref()
        .is_none_or(|list| list.len() == ctx.files.input.len());
    session.set_env(OUTPUT_DIR_ENV, ctx.output_root().to_string_lossy());
    if render_all {
        session.set_env(RENDER_ALL_ENV, "1");
    } else {
        session.remove_env(RENDER_ALL_ENV);
    }

    let files = files.unwrap_or_else(|| ctx.files.input.clone());
    let mut to_render: Vec<RenderFile> = files.into_iter().map(RenderFile::new).collect();

    let Supplement {
        files: supplements,
        on_render_complete,
    } = if options.dev_server_reload {
        Supplement::default()
    } else {
        ctx.kind.supplement_render(ctx, &to_render, incremental)
    };
    let supplemental: Vec<PathBuf> = supplements.iter().map(|f| f.path.clone()).collect();
    to_render.extend(supplements);

    ensure_gitignore(&ctx.dir)?;

    let quiet = options.flags.quiet;
    options.progress =
        !options.dev_server_reload && (options.progress || to_render.len() > 1);

    if render_all
        && options.flags.clean
        && ctx.kind.clean_output_dir()
        && let Some(output_dir) = ctx.output_dir()
    {
        clean_output_dir(ctx, &output_dir)?;
    }

    let project = &ctx.config.project;
    if !to_render.is_empty() && !project.pre_render.is_empty() {
        let inputs: Vec<PathBuf> = to_render.iter().map(|f| ctx.relative(&f.path)).collect();
        let env = [(
            INPUT_FILES_ENV.to_owned(),
            files_env_value(inputs.iter().map(PathBuf::as_path)),
        )];
        run_hooks(ctx, &project.pre_render, &env, &session.env(), quiet)?;
    }
    ctx.kind.pre_render(ctx)?;

    if options.flags.execute_dir.is_none() && project.execute_dir == ExecuteDir::Project {
        options.flags.execute_dir = Some(ctx.dir.clone());
    }
    if to_render.len() > DAEMON_FILE_LIMIT && options.flags.execute_daemon.is_none() {
        options.flags.execute_daemon = Some(0);
    }

    if let Some(output_dir) = ctx.output_dir() {
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    }

    let output = engine.render_files(&to_render, &options, ctx);

    let resolver = DefaultResourceResolver;
    let mut result = RenderResult {
        base_dir: ctx.dir.clone(),
        output_dir: ctx.output_dir_name().map(PathBuf::from),
        files: Vec::with_capacity(output.files.len()),
        error: None,
    };

    if let Some(output_dir) = ctx.output_dir() {
        let (relocated, keep_libs) = relocate_outputs(ctx, &output.files)?;
        for (rendered, moved) in output.files.iter().zip(relocated) {
            result.files.push(result_file(
                ctx,
                &resolver,
                rendered,
                &moved.file,
                &moved.supporting,
            )?);
        }
        relocate_lib_dir(ctx, &output_dir, incremental || options.use_freezer, keep_libs)?;

        let source_outputs: Vec<PathBuf> = output.files.iter().map(|f| f.file.clone()).collect();
        copy_resources(ctx, &mut result.files, &source_outputs)?;
    } else {
        for rendered in &output.files {
            result.files.push(result_file(
                ctx,
                &resolver,
                rendered,
                &rendered.file,
                &rendered.supporting,
            )?);
        }
    }

    result.error = output.error;

    if result.error.is_none() {
        let outputs: Vec<ProjectOutputFile> = result
            .files
            .iter()
            .map(|f| ProjectOutputFile {
                file: ctx.dir.join(&f.file),
                format: f.format.clone(),
                resources: f.resource_files.clone(),
                supporting: f.supporting.iter().map(|s| ctx.dir.join(s)).collect(),
            })
            .collect();
        ctx.kind.post_render(ctx, incremental, &outputs)?;

        if !project.post_render.is_empty() && (!incremental || project.always_run_hooks) {
            let env = [(
                OUTPUT_FILES_ENV.to_owned(),
                files_env_value(result.files.iter().map(|f| f.file.as_path())),
            )];
            run_hooks(ctx, &project.post_render, &env, &session.env(), quiet)?;
        }

        if options.progress && !quiet {
            log!("render"; "output created: {}", ctx.relative(&ctx.output_root()).display());
        }
    }

    for file in &mut result.files {
        file.supplemental = supplemental.contains(&ctx.dir.join(&file.input));
    }
    if let Some(callback) = on_render_complete {
        let primary: Vec<PathBuf> = result
            .files
            .iter()
            .filter(|f| !f.supplemental)
            .map(|f| f.file.clone())
            .collect();
        callback(ctx, &primary);
    }

    Ok(result)
}

/// Absolute, normalized, existing render targets. Relative paths are
/// resolved against the current directory.
fn normalize_files(files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    files
        .iter()
        .map(|file| {
            let target = if file.is_absolute() {
                file.clone()
            } else {
                cwd.join(file)
            };
            if !target.exists() {
                return Err(RenderError::TargetNotFound(file.clone()).into());
            }
            Ok(normalize_path(&target))
        })
        .collect()
}

/// Delete the output directory unless it resolves to the project itself.
fn clean_output_dir(ctx: &ProjectContext, output_dir: &Path) -> Result<()> {
    let project = normalize_path(&ctx.dir);
    if output_dir.exists() {
        let real = normalize_path(output_dir);
        if real != project && real.starts_with(&project) {
            remove_if_exists(&real).with_context(|| format!("Failed to clean {}", real.display()))?;
            debug!("render"; "cleaned {}", real.display());
        } else {
            log!("warning"; "not cleaning {}: it resolves to the project directory", output_dir.display());
        }
    }
    clear_project_index(&project)
}

fn result_file(
    ctx: &ProjectContext,
    resolver: &dyn ResourceResolver,
    rendered: &RenderedFile,
    file: &Path,
    supporting: &[PathBuf],
) -> Result<RenderResultFile> {
    let resource_files = file_resources(resolver, &ctx.dir, &rendered.input, &ctx.exclude_dirs())?;
    Ok(RenderResultFile {
        input: ctx.relative(&rendered.input),
        file: ctx.relative(file),
        format: rendered.format.clone(),
        supporting: supporting.iter().map(|s| ctx.relative(s)).collect(),
        resource_files,
        supplemental: false,
    })
}
