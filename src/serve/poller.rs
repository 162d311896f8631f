//! Modification-time polling for outputs the watcher cannot observe
//! reliably (multi-pass PDF builds rewrite their output in place).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::runtime::Handle;

use super::watch::ProjectWatcher;
use crate::freshness::get_mtime;
use crate::log;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reload clients whenever one of `outputs` gets a new modification time
/// that no watcher render accounts for.
pub fn spawn_output_poller(runtime: &Handle, watcher: Arc<ProjectWatcher>, outputs: Vec<PathBuf>) {
    if outputs.is_empty() {
        return;
    }
    runtime.spawn(async move {
        let mut seen: Vec<Option<SystemTime>> = outputs.iter().map(|p| get_mtime(p)).collect();
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        loop {
            interval.tick().await;
            for (output, last) in outputs.iter().zip(seen.iter_mut()) {
                let Some(mtime) = get_mtime(output) else {
                    continue;
                };
                if *last == Some(mtime) {
                    continue;
                }
                *last = Some(mtime);
                if watcher.covers_output(output, mtime) {
                    continue;
                }
                if let Err(e) = watcher.reload_output(Some(output.clone())).await {
                    log!("error"; "{:#}", e);
                }
            }
        }
    });
}
