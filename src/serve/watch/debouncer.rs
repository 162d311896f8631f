use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

/// Quiet period before a batch is handed over.
pub(super) const DEBOUNCE_MS: u64 = 100;

/// Trailing-edge debouncer: collects changed paths until no event has
/// arrived for [`DEBOUNCE_MS`], then yields them as one batch.
pub(super) struct Debouncer {
    pub(super) paths: FxHashSet<PathBuf>,
    pub(super) last_event: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            paths: FxHashSet::default(),
            last_event: None,
        }
    }

    /// Add the paths of a notify event. Access and metadata-only events
    /// carry no content change and are dropped.
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;
        use notify::event::ModifyKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            EventKind::Modify(ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }
        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);
        self.add_paths(event.paths.iter().map(PathBuf::as_path));
    }

    pub(super) fn add_paths<'a>(&mut self, paths: impl IntoIterator<Item = &'a Path>) {
        let mut added = false;
        for path in paths {
            if is_temp_file(path) {
                continue;
            }
            self.paths.insert(path.to_path_buf());
            added = true;
        }
        if added {
            self.last_event = Some(Instant::now());
        }
    }

    pub(super) fn is_ready(&self) -> bool {
        self.last_event
            .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
            && !self.paths.is_empty()
    }

    /// Take the batch once the quiet period has passed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<PathBuf>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        let mut batch: Vec<PathBuf> = std::mem::take(&mut self.paths).into_iter().collect();
        batch.sort();
        Some(batch)
    }

    /// Time until the pending batch could be ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        match self.last_event {
            Some(t) => Duration::from_millis(DEBOUNCE_MS)
                .saturating_sub(t.elapsed())
                .max(Duration::from_millis(1)),
            None => Duration::from_secs(86400),
        }
    }
}

/// Editor swap and backup files.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
}
