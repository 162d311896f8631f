//! Preview server with live reload and render-on-request.
//!
//! ```text
//! preview()
//!   ├─ initial render (RenderQueue)
//!   ├─ ProjectWatcher (notify) ──► RenderQueue ──► DevServer::reload_clients
//!   ├─ output poller (non-HTML outputs)
//!   ├─ timeout monitor
//!   └─ request loop (rayon)
//!        ├─ WebSocket upgrade ──► DevServer
//!        ├─ stale HTML/PDF/text ──► render_file ──► serve
//!        └─ anything else ──► output tree
//! ```

pub mod devserver;
mod lifecycle;
mod path;
mod poller;
pub mod render_hash;
mod response;
pub mod watch;

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam::channel;
use tiny_http::Request;

use crate::core::{BuildSession, is_shutdown, register_server};
use crate::embed::serve::PREVIEW_JS_PATH;
use crate::freshness::get_mtime;
use crate::project::index::{clear_project_index, input_for_output_file, input_target_index};
use crate::project::{ProjectContext, ProjectHandle};
use crate::render::{
    Format, RenderFlags, RenderObserver, RenderOptions, RenderQueue, RenderResult, render_file,
    render_project,
};
use crate::utils::mime::{self, types};
use crate::utils::path::forward_slashes;
use crate::{debug, log, logger};

use devserver::DevServer;
use render_hash::RenderHashTracker;
use response::PageInfo;
use watch::{ProjectWatcher, WatchOptions};

/// Set by an IDE that hosts the preview and shows presentations itself.
pub const HOST_IDE_ENV: &str = "QUIRE_HOST_IDE";

/// Number of threads answering HTTP requests.
const REQUEST_THREADS: usize = 4;

/// What to render before serving.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InitialRender {
    /// Only inputs whose output is missing or older than the input.
    None,
    /// Every input, reusing frozen results.
    #[default]
    Default,
    /// Every input, in this format only.
    Format(String),
}

impl InitialRender {
    pub fn parse(value: &str) -> Self {
        match value {
            "none" => Self::None,
            "default" | "all" => Self::Default,
            format => Self::Format(format.to_owned()),
        }
    }
}

/// Preview options; `None` falls back to the project's `[serve]` section.
#[derive(Debug, Clone, Default)]
pub struct PreviewOptions {
    pub port: Option<u16>,
    pub host: Option<IpAddr>,
    pub browse: Option<bool>,
    pub watch_inputs: Option<bool>,
    pub timeout: Option<u64>,
    pub render: InitialRender,
    /// Navigate clients to the output that changed.
    pub navigate: bool,
    pub flags: RenderFlags,
}

/// Shared by every request handler.
struct PreviewState {
    handle: Arc<ProjectHandle>,
    queue: Arc<RenderQueue>,
    tracker: Arc<RenderHashTracker>,
    server: Arc<DevServer>,
    flags: RenderFlags,
}

/// Render `dir`, serve its output and keep it current until shutdown.
pub fn preview(dir: &Path, session: Arc<BuildSession>, options: PreviewOptions) -> Result<()> {
    let ctx = ProjectContext::load(dir, &session)?;
    clear_project_index(&ctx.dir)?;
    let serve = ctx.config.serve.clone();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("quire-preview")
        .enable_all()
        .build()
        .context("Failed to start the preview runtime")?;

    let server = DevServer::new();
    let queue = Arc::new(RenderQueue::new(
        runtime.handle(),
        Some(Arc::clone(&server) as Arc<dyn RenderObserver>),
    ));
    let tracker = Arc::new(RenderHashTracker::new());
    let handle = Arc::new(ProjectHandle::new(ctx, Arc::clone(&session)));

    let initial = initial_render(&handle, &queue, &options)?;
    if let Some(result) = &initial {
        tracker.on_render_result(result, &handle.get());
    }

    let watch_inputs = options.watch_inputs.unwrap_or(serve.watch_inputs);
    let watcher = Arc::new(ProjectWatcher::new(
        Arc::clone(&handle),
        Arc::clone(&queue),
        Arc::clone(&tracker),
        Arc::clone(&server) as Arc<dyn watch::Reloader>,
        watch_options(&handle.get(), &options, watch_inputs),
    ));
    if let Some(result) = &initial {
        watcher.record_rendered(result);
    }
    Arc::clone(&watcher)
        .spawn(runtime.handle())
        .context("Failed to watch the project")?;

    let polled = initial.as_ref().map(polled_outputs).unwrap_or_default();
    poller::spawn_output_poller(runtime.handle(), Arc::clone(&watcher), polled);

    let interface = options.host.unwrap_or(serve.interface);
    let (http, addr) = lifecycle::bind_with_retry(interface, options.port.unwrap_or(serve.port))?;
    let http = Arc::new(http);
    let url = format!("http://{addr}/");
    let lock = lifecycle::PreviewLock::acquire(&handle.get().dir, &url)?;

    let (shutdown_tx, _shutdown_rx) = channel::unbounded::<()>();
    register_server(Arc::clone(&http), shutdown_tx);
    server.install_log_sink();

    log!("preview"; "watching files for changes");
    log!("preview"; "browse at {}", url);
    lifecycle::spawn_timeout_monitor(
        Arc::clone(&server),
        Arc::clone(&queue),
        Duration::from_secs(options.timeout.unwrap_or(serve.timeout)),
    );
    if options.browse.unwrap_or(serve.browse) {
        let path = initial
            .as_ref()
            .and_then(|result| browse_path(&handle.get(), result))
            .unwrap_or_default();
        lifecycle::open_browser(&format!("{url}{path}"));
    }

    let state = Arc::new(PreviewState {
        handle,
        queue,
        tracker,
        server,
        flags: options.flags,
    });
    run_request_loop(&http, &state)?;

    logger::clear_sink();
    drop(lock);
    runtime.shutdown_background();
    Ok(())
}

// ============================================================================
// Initial render
// ============================================================================

/// Render what the preview needs before serving. `None` when nothing
/// had to be rendered.
fn initial_render(
    handle: &ProjectHandle,
    queue: &RenderQueue,
    options: &PreviewOptions,
) -> Result<Option<RenderResult>> {
    let ctx = handle.get();
    let (inputs, to) = match &options.render {
        InitialRender::None => {
            let stale = stale_inputs(&ctx);
            if stale.is_empty() {
                debug!("preview"; "all outputs current, skipping initial render");
                return Ok(None);
            }
            (Some(stale), None)
        }
        InitialRender::Default => (None, None),
        InitialRender::Format(format) => (None, Some(format.clone())),
    };

    let render_options = RenderOptions {
        use_freezer: true,
        flags: RenderFlags {
            to: to.or_else(|| options.flags.to.clone()),
            ..options.flags.clone()
        },
        progress: true,
        ..Default::default()
    };
    let session = Arc::clone(handle.session());
    let mut result =
        queue.submit_blocking(move || render_project(&ctx, &session, render_options, inputs))??;
    if let Some(error) = result.error.take() {
        return Err(error.context("Initial render failed"));
    }
    Ok(Some(result))
}

/// Watcher settings for a preview. HTML outputs are rendered when
/// requested, so only a PDF preview needs a full render on reload.
fn watch_options(ctx: &ProjectContext, options: &PreviewOptions, watch_inputs: bool) -> WatchOptions {
    WatchOptions {
        watch_inputs,
        render_on_reload: !pdf_output(ctx, options),
        host_presentation: std::env::var_os(HOST_IDE_ENV).is_some(),
        navigate: options.navigate,
        flags: RenderFlags {
            to: None,
            ..options.flags.clone()
        },
    }
}

/// Whether the previewed format produces a PDF.
fn pdf_output(ctx: &ProjectContext, options: &PreviewOptions) -> bool {
    let name = match &options.render {
        InitialRender::Format(name) => Some(name.clone()),
        _ => options.flags.to.clone(),
    };
    let format = match name {
        Some(name) => Some(ctx.config.format(&name)),
        None => ctx.formats().into_iter().next(),
    };
    format.is_some_and(|f| f.ext == "pdf")
}

/// Inputs with a primary output that is missing or older than the input.
fn stale_inputs(ctx: &ProjectContext) -> Vec<PathBuf> {
    let formats = ctx.formats();
    ctx.files
        .input
        .iter()
        .filter(|input| {
            let Ok(index) = input_target_index(ctx, &ctx.relative(input)) else {
                return true;
            };
            let input_mtime = get_mtime(input);
            formats.iter().any(|format| {
                let Some(name) = index.formats.get(&format.name) else {
                    return false;
                };
                match get_mtime(&ctx.format_output_dir(format).join(name)) {
                    Some(output_mtime) => input_mtime.is_some_and(|m| m > output_mtime),
                    None => true,
                }
            })
        })
        .cloned()
        .collect()
}

/// Primary outputs the watcher cannot follow reliably.
fn polled_outputs(result: &RenderResult) -> Vec<PathBuf> {
    result
        .files
        .iter()
        .filter(|f| !f.supplemental && !f.format.is_html())
        .map(|f| result.base_dir.join(&f.file))
        .collect()
}

/// Server path (without the leading slash) of the first rendered output.
fn browse_path(ctx: &ProjectContext, result: &RenderResult) -> Option<String> {
    let file = result.first_primary()?;
    let output = result.base_dir.join(&file.file);
    let rel = output.strip_prefix(ctx.output_root()).ok()?;
    Some(forward_slashes(rel))
}

// ============================================================================
// Requests
// ============================================================================

fn run_request_loop(http: &tiny_http::Server, state: &Arc<PreviewState>) -> Result<()> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(REQUEST_THREADS)
        .thread_name(|i| format!("quire-http-{i}"))
        .build()
        .context("Failed to create the request thread pool")?;

    for request in http.incoming_requests() {
        let state = Arc::clone(state);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &state) {
                debug!("preview"; "request error: {:#}", e);
            }
        });
    }
    Ok(())
}

fn handle_request(request: Request, state: &PreviewState) -> Result<()> {
    if is_shutdown() {
        return response::respond_unavailable(request);
    }
    if DevServer::handles(&request) {
        return state.server.connect(request);
    }
    if request.url() == PREVIEW_JS_PATH {
        return response::respond_preview_js(request);
    }

    let mut ctx = state.handle.get();
    let root = ctx.output_root();
    let Some(target) = path::target_path(request.url(), &root) else {
        return response::respond_not_found(request, &root);
    };
    let content_type = mime::from_path(&target);

    if mime::is_html(content_type)
        && let Some(message) = state.server.render_error()
    {
        return response::respond_render_error(request, "Render error", &message);
    }

    let mut page_input: Option<(String, Format)> = None;
    if renders_on_request(content_type) {
        let mut source = input_for_output_file(&ctx, &target);
        if source.is_none() {
            // the output may belong to an input created since the last scan
            ctx = state.handle.refresh()?;
            source = input_for_output_file(&ctx, &target);
        }
        if let Some((input, format)) = source {
            let rel = forward_slashes(&ctx.relative(&input));
            if let Err(e) = render_if_stale(state, &ctx, &target, &input) {
                log!("error"; "{:#}", e);
                return response::respond_render_error(request, &rel, &format!("{e:#}"));
            }
            page_input = Some((rel, format));
        }
    }

    let Some(path) = path::resolve_path(request.url(), &root) else {
        return response::respond_not_found(request, &root);
    };
    let page = match &page_input {
        Some((rel, format)) => PageInfo {
            input_file: Some(rel.as_str()),
            is_presentation: format.is_presentation(),
        },
        None => PageInfo::default(),
    };
    response::respond_file(request, &path, page)
}

/// Outputs rendered on demand when their fingerprint changed.
fn renders_on_request(content_type: &str) -> bool {
    mime::is_html(content_type)
        || matches!(content_type, types::PDF | types::PLAIN | types::MARKDOWN)
}

/// Render `input` before serving `target` when the target is out of date.
/// The render waits behind whatever the queue is already running.
fn render_if_stale(state: &PreviewState, ctx: &Arc<ProjectContext>, target: &Path, input: &Path) -> Result<()> {
    let resources = state.tracker.resources_for(target);
    if !state.tracker.file_requires_rerender(target, input, &resources, ctx) {
        return Ok(());
    }
    debug!("preview"; "rendering {} on request", forward_slashes(&ctx.relative(input)));

    let options = RenderOptions {
        use_freezer: true,
        dev_server_reload: true,
        flags: RenderFlags {
            to: None,
            quiet: true,
            ..state.flags.clone()
        },
        ..Default::default()
    };
    let session = Arc::clone(state.handle.session());
    let task_ctx = Arc::clone(ctx);
    let task_input = input.to_path_buf();
    let mut result = state
        .queue
        .submit_blocking(move || render_file(&task_ctx, &session, task_input, options))??;
    if let Some(error) = result.error.take() {
        return Err(error);
    }
    state.tracker.on_render_result(&result, ctx);
    Ok(())
}

#[cfg(test)]
mod tests;
