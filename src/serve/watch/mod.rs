//! Project watcher and reload coordinator.
//!
//! ```text
//! notify ──► Debouncer (timing) ──► relevant_paths ──┬─► changed inputs ──► render inputs
//!                                                     └─► classify ──► full render ──► reload
//! ```
//!
//! Every render goes through the shared [`RenderQueue`]; the watcher only
//! decides what to submit and what to tell connected clients afterwards.

mod classifier;
mod debouncer;
mod roots;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use notify::RecommendedWatcher;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

pub use classifier::Classification;
use classifier::{changed_inputs, classify, relevant_paths};
use debouncer::Debouncer;
use roots::WatchRoots;

use super::render_hash::RenderHashTracker;
use crate::freshness::{ContentHash, get_mtime, hash_file};
use crate::project::index::input_for_output_file;
use crate::project::{ProjectContext, ProjectHandle};
use crate::render::{
    RenderFlags, RenderOptions, RenderQueue, RenderResult, render_file, render_project,
};
use crate::utils::path::forward_slashes;
use crate::{debug, log, logger};

/// Receives the watcher's verdict for connected clients.
pub trait Reloader: Send + Sync {
    /// Reload every client, navigating to `target` (a server path such as
    /// `/posts/a.html`) when given.
    fn reload_clients(&self, target: Option<&str>);

    /// A render triggered by the watcher failed.
    fn render_failed(&self, message: &str);
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Re-render changed inputs instead of only reloading.
    pub watch_inputs: bool,
    /// The server renders stale outputs when they are requested, so a
    /// reload never needs a full render first.
    pub render_on_reload: bool,
    /// Running inside a host IDE that previews presentations itself.
    pub host_presentation: bool,
    /// Navigate clients to the output that just changed.
    pub navigate: bool,
    /// Flags applied to every watcher-triggered render.
    pub flags: RenderFlags,
}

/// What handling one batch amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing relevant changed.
    Ignored,
    /// Clients were told to reload, optionally navigating to `target`.
    Reloaded { target: Option<String> },
    /// The reload was left to the host IDE.
    Suppressed,
    /// A render failed; clients were shown the error.
    Failed,
}

pub struct ProjectWatcher {
    handle: Arc<ProjectHandle>,
    queue: Arc<RenderQueue>,
    tracker: Arc<RenderHashTracker>,
    reloader: Arc<dyn Reloader>,
    options: WatchOptions,
    /// Input content hashes at their last successful render.
    rendered: Mutex<FxHashMap<PathBuf, ContentHash>>,
    /// Output modification times clients were already reloaded for.
    announced: Mutex<FxHashMap<PathBuf, SystemTime>>,
}

impl ProjectWatcher {
    pub fn new(
        handle: Arc<ProjectHandle>,
        queue: Arc<RenderQueue>,
        tracker: Arc<RenderHashTracker>,
        reloader: Arc<dyn Reloader>,
        options: WatchOptions,
    ) -> Self {
        Self {
            handle,
            queue,
            tracker,
            reloader,
            options,
            rendered: Mutex::new(FxHashMap::default()),
            announced: Mutex::new(FxHashMap::default()),
        }
    }

    /// Record inputs rendered before watching started, so an unchanged
    /// save right after startup does not re-render them.
    pub fn record_rendered(&self, result: &RenderResult) {
        if !result.is_ok() {
            return;
        }
        let mut rendered = self.rendered.lock();
        for file in &result.files {
            let input = result.base_dir.join(&file.input);
            rendered.insert(input.clone(), hash_file(&input));
        }
    }

    /// Whether a change of `output` to `mtime` is covered by a watcher
    /// render, either still running or finished with a reload.
    pub fn covers_output(&self, output: &Path, mtime: SystemTime) -> bool {
        self.queue.is_rendering() || self.announced.lock().get(output) == Some(&mtime)
    }

    fn announce_outputs(&self, result: &RenderResult) {
        let mut announced = self.announced.lock();
        for file in &result.files {
            let output = result.base_dir.join(&file.file);
            if let Some(mtime) = get_mtime(&output) {
                announced.insert(output, mtime);
            }
        }
    }

    /// Start watching and handle batches until the runtime shuts down.
    pub fn spawn(self: Arc<Self>, runtime: &tokio::runtime::Handle) -> notify::Result<()> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })?;

        let mut roots = WatchRoots::new(&self.handle.get());
        roots.attach_existing(&mut watcher)?;

        let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(256);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        runtime.spawn(async move {
            let mut debouncer = Debouncer::new();
            loop {
                tokio::select! {
                    biased;
                    event = async_rx.recv() => match event {
                        Some(event) => debouncer.add_event(&event),
                        None => break,
                    },
                    _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                        let Some(batch) = debouncer.take_if_ready() else {
                            continue;
                        };
                        roots.maintain(&mut watcher, &batch);
                        // a failing batch never stops the watch
                        if let Err(e) = self.handle_batch(&batch).await {
                            log!("error"; "{:#}", e);
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Act on one debounced batch of changed paths.
    pub async fn handle_batch(&self, paths: &[PathBuf]) -> Result<BatchOutcome> {
        let ctx = self.handle.get();
        let paths = relevant_paths(&ctx, paths);
        if paths.is_empty() {
            return Ok(BatchOutcome::Ignored);
        }
        debug!("watch"; "batch: {} path(s)", paths.len());

        if self.options.watch_inputs {
            let inputs = changed_inputs(&ctx, &paths, &self.rendered.lock());
            if !inputs.is_empty() {
                return self.render_inputs(ctx, inputs).await;
            }
        }

        let class = classify(&ctx, &paths, &self.tracker.all_resources());
        if !class.reload() {
            if self.options.watch_inputs && paths.iter().any(|p| ctx.is_input(p)) {
                logger::status_unchanged("saved without changes");
            }
            return Ok(BatchOutcome::Ignored);
        }
        debug!("watch"; "reload: {:?}", class);

        self.reload(Changes {
            config: class.refresh_config(),
            output: false,
            target: None,
        })
        .await
    }

    /// Reload clients after `target` (an absolute output path) changed
    /// outside the watcher, e.g. a polled PDF.
    pub async fn reload_output(&self, target: Option<PathBuf>) -> Result<BatchOutcome> {
        self.reload(Changes {
            config: false,
            output: true,
            target,
        })
        .await
    }

    async fn render_inputs(
        &self,
        ctx: Arc<ProjectContext>,
        inputs: Vec<PathBuf>,
    ) -> Result<BatchOutcome> {
        for input in &inputs {
            log!("watch"; "{} changed", forward_slashes(&ctx.relative(input)));
        }
        logger::status_detach();

        let session = Arc::clone(self.handle.session());
        let options = RenderOptions {
            flags: self.options.flags.clone(),
            progress: inputs.len() > 1,
            ..Default::default()
        };
        let task_ctx = Arc::clone(&ctx);
        let task_inputs = inputs.clone();
        let result = self
            .queue
            .submit(move || match task_inputs.as_slice() {
                [single] => render_file(&task_ctx, &session, single.clone(), options),
                _ => render_project(&task_ctx, &session, options, Some(task_inputs)),
            })
            .await?;

        let result = match result {
            Ok(result) if result.is_ok() => result,
            Ok(result) => return Ok(self.fail(result.error)),
            Err(e) => return Ok(self.fail(Some(e))),
        };

        {
            let mut rendered = self.rendered.lock();
            for input in &inputs {
                rendered.insert(input.clone(), hash_file(input));
            }
        }
        self.tracker.on_render_result(&result, &ctx);
        self.announce_outputs(&result);
        logger::status_success(&match inputs.as_slice() {
            [single] => format!("rendered {}", forward_slashes(&ctx.relative(single))),
            _ => format!("rendered {} files", inputs.len()),
        });

        let target = result
            .files
            .iter()
            .find(|f| !f.supplemental && f.format.ext != "pdf")
            .map(|f| result.base_dir.join(&f.file));
        self.reload(Changes {
            config: false,
            output: true,
            target,
        })
        .await
    }

    async fn reload(&self, changes: Changes) -> Result<BatchOutcome> {
        if !changes.output && !self.options.render_on_reload {
            let ctx = self.handle.refresh()?;
            let session = Arc::clone(self.handle.session());
            let options = RenderOptions {
                use_freezer: true,
                dev_server_reload: true,
                flags: self.options.flags.clone(),
                ..Default::default()
            };
            let task_ctx = Arc::clone(&ctx);
            let result = self
                .queue
                .submit(move || render_project(&task_ctx, &session, options, None))
                .await?;
            match result {
                Ok(result) if result.is_ok() => {
                    self.tracker.on_render_result(&result, &ctx);
                    self.record_rendered(&result);
                    self.announce_outputs(&result);
                    logger::status_success("rendered project");
                }
                Ok(result) => return Ok(self.fail(result.error)),
                Err(e) => return Ok(self.fail(Some(e))),
            }
        }

        if changes.config {
            self.handle.refresh()?;
        }

        let ctx = self.handle.get();
        if let Some(target) = &changes.target
            && self.prevent_reload(&ctx, target)
        {
            debug!("watch"; "presentation reload left to host");
            return Ok(BatchOutcome::Suppressed);
        }

        let target = changes.target.filter(|_| self.options.navigate).and_then(|target| {
            let found = reload_target(&ctx, &target);
            if found.is_none() {
                logger::status_warning(&format!(
                    "{} is not in the output, reloading in place",
                    forward_slashes(&ctx.relative(&target))
                ));
            }
            found
        });
        self.reloader.reload_clients(target.as_deref());
        Ok(BatchOutcome::Reloaded { target })
    }

    /// A host IDE without input watching previews presentations itself.
    fn prevent_reload(&self, ctx: &ProjectContext, target: &Path) -> bool {
        if !self.options.host_presentation || self.options.watch_inputs {
            return false;
        }
        input_for_output_file(ctx, target).is_some_and(|(_, format)| format.is_presentation())
    }

    fn fail(&self, error: Option<anyhow::Error>) -> BatchOutcome {
        let message = error.map_or_else(|| "render failed".to_owned(), |e| format!("{e:#}"));
        logger::status_error("render failed", &message);
        self.reloader.render_failed(&message);
        BatchOutcome::Failed
    }
}

/// What a reload was caused by.
struct Changes {
    /// Configuration may have changed; re-scan the project afterwards.
    config: bool,
    /// Outputs were already produced, no full render needed.
    output: bool,
    /// Absolute output path to navigate to.
    target: Option<PathBuf>,
}

/// Server path of an output file, if it exists under the output root.
fn reload_target(ctx: &ProjectContext, target: &Path) -> Option<String> {
    let output_root = ctx.output_root();
    let rel = target
        .strip_prefix(&output_root)
        .or_else(|_| target.strip_prefix(&ctx.dir))
        .ok()?;
    output_root
        .join(rel)
        .is_file()
        .then(|| format!("/{}", forward_slashes(rel)))
}
