//! Rendering engine adapter.
//!
//! [`CommandEngine`] renders each input per format in three steps:
//!
//! 1. execute code (`[execute] command`), or reuse a frozen result
//! 2. write the executed markdown to `<stem>.<ext>.md`
//! 3. run the `[engine] command` template, or the built-in HTML writer

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{Format, RenderFile, RenderOptions, input_files_dir};
use crate::config::FreezeMode;
use crate::freeze::{
    ExecuteResult, FREEZE_DIR, IncludeSource, TempContext, copy_from_project_freezer,
    copy_to_project_freezer, defrost_execute_result, freeze_execute_result, freezer_figs_dir,
    freezer_freeze_file, remove_freeze_results,
};
use crate::project::ProjectContext;
use crate::utils::exec::{Cmd, EMPTY_FILTER, SILENT_FILTER};
use crate::utils::html::escape;
use crate::utils::path::{remove_if_empty_dir, safe_remove_if_exists};
use crate::{debug, log};

/// One engine output, still inside the source tree. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub input: PathBuf,
    pub format: Format,
    pub file: PathBuf,
    pub supporting: Vec<PathBuf>,
    /// Kept intermediates (`keep-md` and friends); they stay in place.
    pub intermediates: Vec<PathBuf>,
}

/// Batch output. Files rendered before an error are kept.
#[derive(Debug, Default)]
pub struct EngineOutput {
    pub files: Vec<RenderedFile>,
    pub error: Option<anyhow::Error>,
}

pub trait RenderEngine: Send + Sync {
    fn render_files(
        &self,
        files: &[RenderFile],
        options: &RenderOptions,
        ctx: &ProjectContext,
    ) -> EngineOutput;
}

/// Engine driven by the `[execute]` and `[engine]` config commands.
#[derive(Debug, Default)]
pub struct CommandEngine;

impl RenderEngine for CommandEngine {
    fn render_files(
        &self,
        files: &[RenderFile],
        options: &RenderOptions,
        ctx: &ProjectContext,
    ) -> EngineOutput {
        let mut output = EngineOutput::default();
        let temp = match TempContext::new() {
            Ok(temp) => temp,
            Err(e) => {
                output.error = Some(anyhow::Error::new(e).context("Failed to create temp directory"));
                return output;
            }
        };

        let total = files.len();
        for (i, file) in files.iter().enumerate() {
            if options.progress && !options.flags.quiet {
                log!("render"; "[{}/{}] {}", i + 1, total, ctx.relative(&file.path).display());
            }
            for format in target_formats(file, options, ctx) {
                match render_one(file, &format, options, ctx, &temp) {
                    Ok(rendered) => output.files.push(rendered),
                    Err(e) => {
                        output.error = Some(e.context(format!(
                            "Failed to render {}",
                            ctx.relative(&file.path).display()
                        )));
                        return output;
                    }
                }
            }
        }
        output
    }
}

fn target_formats(file: &RenderFile, options: &RenderOptions, ctx: &ProjectContext) -> Vec<Format> {
    if let Some(to) = &options.flags.to {
        return vec![ctx.config.format(to)];
    }
    match &file.formats {
        Some(names) => names.iter().map(|n| ctx.config.format(n)).collect(),
        None => ctx.formats(),
    }
}

fn render_one(
    file: &RenderFile,
    format: &Format,
    options: &RenderOptions,
    ctx: &ProjectContext,
    temp: &TempContext,
) -> Result<RenderedFile> {
    let input = &file.path;
    let dir = input.parent().unwrap_or(&ctx.dir);
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let output = dir.join(format!("{stem}.{}", format.ext));
    let files_dir = dir.join(input_files_dir(input));
    let cwd = options.flags.execute_dir.clone().unwrap_or_else(|| dir.to_path_buf());

    let result = execute(ctx, input, &output, &files_dir, format, options, temp, &cwd)?;

    let intermediate = dir.join(format!("{stem}.{}.md", format.ext));
    fs::write(&intermediate, &result.markdown)
        .with_context(|| format!("Failed to write {}", intermediate.display()))?;

    let engine = &ctx.config.engine.command;
    let written = if engine.is_empty() {
        write_default_output(&output, &stem, format, &result)
    } else {
        run_engine_command(engine, &intermediate, &output, &files_dir, format, options, ctx, &cwd)
    };
    if let Err(e) = written {
        safe_remove_if_exists(&intermediate);
        return Err(e);
    }

    let mut intermediates = Vec::new();
    if format.keep_md {
        intermediates.push(intermediate);
    } else {
        safe_remove_if_exists(&intermediate);
    }
    for (keep, ext) in [(format.keep_tex, "tex"), (format.keep_typ, "typ")] {
        let kept = dir.join(format!("{stem}.{ext}"));
        if keep && ext != format.ext && kept.is_file() {
            intermediates.push(kept);
        }
    }

    let mut supporting: Vec<PathBuf> = result
        .supporting
        .into_iter()
        .filter(|p| p.exists())
        .collect();
    if files_dir.is_dir() && !supporting.contains(&files_dir) {
        supporting.push(files_dir);
    }

    Ok(RenderedFile {
        input: input.clone(),
        format: format.clone(),
        file: output,
        supporting,
        intermediates,
    })
}

// ============================================================================
// Execution and freezing
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn execute(
    ctx: &ProjectContext,
    input: &Path,
    output: &Path,
    files_dir: &Path,
    format: &Format,
    options: &RenderOptions,
    temp: &TempContext,
    cwd: &Path,
) -> Result<ExecuteResult> {
    let freeze = ctx.config.execute.freeze;
    let hidden = freeze == FreezeMode::Off;
    let files_dir_rel = ctx.relative(files_dir);

    // Some(force) when a frozen result may be used
    let thaw = if options.always_execute.iter().any(|p| p == input) {
        None
    } else {
        match freeze {
            FreezeMode::On => Some(true),
            FreezeMode::Auto => Some(false),
            FreezeMode::Off => options.use_freezer.then_some(false),
        }
    };

    if let Some(force) = thaw {
        copy_from_project_freezer(&ctx.dir, &files_dir_rel, hidden)?;
        if let Some(result) = defrost_execute_result(input, output, temp, force)? {
            if let Some(lib) = ctx.lib_dir() {
                copy_from_project_freezer(&ctx.dir, Path::new(lib), hidden)?;
            }
            remove_freeze_results(files_dir)?;
            debug!("freeze"; "reusing frozen result for {}", files_dir_rel.display());
            return Ok(result);
        }
    }

    let result = run_execute(ctx, input, options, cwd)?;

    let freeze_file = freeze_execute_result(input, output, &result)?;
    copy_to_project_freezer(&ctx.dir, &files_dir_rel, true, true)?;
    if freeze == FreezeMode::Off {
        let visible = freezer_freeze_file(&ctx.dir, &ctx.relative(&freeze_file));
        safe_remove_if_exists(&visible);
        safe_remove_if_exists(&freezer_figs_dir(&ctx.dir, &files_dir_rel, &figs_dir(format)));
        cleanup_empty_parents(&visible, &ctx.dir.join(FREEZE_DIR));
    } else {
        copy_to_project_freezer(&ctx.dir, &files_dir_rel, false, true)?;
    }
    remove_freeze_results(files_dir)?;

    Ok(result)
}

/// Figure directory name inside a files dir.
fn figs_dir(format: &Format) -> String {
    format!("figure-{}", format.name)
}

/// Remove empty directories from `path`'s parent up to and including `stop`.
fn cleanup_empty_parents(path: &Path, stop: &Path) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if !current.starts_with(stop) || !matches!(remove_if_empty_dir(current), Ok(true)) {
            break;
        }
        if current == stop {
            break;
        }
        dir = current.parent();
    }
}

/// Run `[execute] command <input>`; without one the source is the markdown.
fn run_execute(
    ctx: &ProjectContext,
    input: &Path,
    options: &RenderOptions,
    cwd: &Path,
) -> Result<ExecuteResult> {
    let command = &ctx.config.execute.command;
    let markdown = if command.is_empty() {
        fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))?
    } else {
        let daemon = options
            .flags
            .execute_daemon
            .or(ctx.config.execute.daemon)
            .map(|d| d.to_string())
            .unwrap_or_default();
        let output = Cmd::from_slice(command)
            .arg(input)
            .cwd(cwd)
            .envs([("QUIRE_EXECUTE_DAEMON", daemon)])
            .filter(if options.flags.quiet { &SILENT_FILTER } else { &EMPTY_FILTER })
            .run()?;
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    Ok(ExecuteResult {
        markdown,
        ..ExecuteResult::default()
    })
}

// ============================================================================
// Output writers
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn run_engine_command(
    template: &[String],
    intermediate: &Path,
    output: &Path,
    files_dir: &Path,
    format: &Format,
    options: &RenderOptions,
    ctx: &ProjectContext,
    cwd: &Path,
) -> Result<()> {
    let input = intermediate.to_string_lossy();
    let output_str = output.to_string_lossy();
    let files_dir_str = files_dir.to_string_lossy();
    let argv: Vec<String> = template
        .iter()
        .map(|arg| {
            arg.replace("{input}", &input)
                .replace("{output}", &output_str)
                .replace("{to}", &format.name)
                .replace("{files_dir}", &files_dir_str)
        })
        .collect();

    Cmd::from_slice(&argv)
        .cwd(cwd)
        .envs(ctx.dir.to_str().map(|d| ("QUIRE_PROJECT_DIR", d)))
        .filter(if options.flags.quiet { &SILENT_FILTER } else { &EMPTY_FILTER })
        .run()?;

    if !output.exists() {
        anyhow::bail!("engine produced no output at {}", output.display());
    }
    Ok(())
}

/// Built-in writer: HTML formats get a minimal document around the
/// escaped markdown; other formats get the markdown as is.
fn write_default_output(output: &Path, title: &str, format: &Format, result: &ExecuteResult) -> Result<()> {
    let content = if format.is_html() {
        let includes = result.includes.clone().unwrap_or_default();
        let read = |list: &[IncludeSource]| -> Result<String> {
            let mut text = String::new();
            for include in list {
                match include {
                    IncludeSource::Text(t) => text.push_str(t),
                    IncludeSource::File(path) => text.push_str(
                        &fs::read_to_string(path)
                            .with_context(|| format!("Failed to read include {}", path.display()))?,
                    ),
                }
            }
            Ok(text)
        };
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n{}</head>\n<body>\n{}<pre class=\"markdown\">{}</pre>\n{}</body>\n</html>\n",
            escape(title),
            read(&includes.include_in_header)?,
            read(&includes.include_before_body)?,
            escape(&result.markdown),
            read(&includes.include_after_body)?,
        )
    } else {
        result.markdown.clone()
    };
    fs::write(output, content).with_context(|| format!("Failed to write {}", output.display()))
}
