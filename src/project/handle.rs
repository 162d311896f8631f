//! Atomically refreshable project context.
//!
//! Uses `arc-swap` for lock-free reads: render tasks take a snapshot with
//! [`ProjectHandle::get`] and keep using it even if the watcher refreshes
//! the project mid-render.

use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;

use super::ProjectContext;
use crate::core::BuildSession;

pub struct ProjectHandle {
    current: ArcSwap<ProjectContext>,
    session: Arc<BuildSession>,
}

impl ProjectHandle {
    pub fn new(ctx: ProjectContext, session: Arc<BuildSession>) -> Self {
        Self {
            current: ArcSwap::from_pointee(ctx),
            session,
        }
    }

    #[inline]
    pub fn get(&self) -> Arc<ProjectContext> {
        self.current.load_full()
    }

    pub fn session(&self) -> &Arc<BuildSession> {
        &self.session
    }

    /// Re-scan the project directory and config, replacing the snapshot.
    pub fn refresh(&self) -> Result<Arc<ProjectContext>> {
        let dir = self.get().dir.clone();
        let ctx = Arc::new(ProjectContext::load(&dir, &self.session)?);
        self.current.store(Arc::clone(&ctx));
        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_refresh_picks_up_new_inputs() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.qmd"), "# A").unwrap();
        let session = BuildSession::new();
        let ctx = ProjectContext::load(dir.path(), &session).unwrap();
        let handle = ProjectHandle::new(ctx, session);

        let before = handle.get();
        fs::write(dir.path().join("b.qmd"), "# B").unwrap();
        handle.refresh().unwrap();

        assert_eq!(before.files.input.len(), 1);
        assert_eq!(handle.get().files.input.len(), 2);
    }
}
