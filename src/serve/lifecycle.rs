//! Server lifecycle: binding, the preview lock, browser opening and the
//! idle timeout.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tiny_http::Server;

use super::devserver::DevServer;
use crate::project::scratch_path;
use crate::render::RenderQueue;
use crate::utils::exec::{Cmd, SILENT_FILTER};
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Lock file of a running preview, relative to the scratch dir.
const LOCK_FILE: &str = "preview/lock";

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(interface: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("preview"; "port {} in use, using {} instead", base_port, port);
                }
                // port 0 lets the OS choose
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Preview lock
// ============================================================================

/// `<project>/.quire/preview/lock`, holding the PID and URL of the running
/// preview. Removed when dropped.
#[derive(Debug)]
pub struct PreviewLock {
    path: PathBuf,
}

impl PreviewLock {
    pub fn acquire(project_dir: &Path, url: &str) -> Result<Self> {
        let path = scratch_path(project_dir, LOCK_FILE);
        if let Some((pid, previous)) = Self::read(project_dir)
            && pid != std::process::id()
        {
            log!("warning"; "another preview (pid {}) was serving this project at {}", pid, previous);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, format!("{}\n{}\n", std::process::id(), url))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(Self { path })
    }

    /// PID and URL recorded by a running (or crashed) preview.
    pub fn read(project_dir: &Path) -> Option<(u32, String)> {
        let content = fs::read_to_string(scratch_path(project_dir, LOCK_FILE)).ok()?;
        let mut lines = content.lines();
        let pid = lines.next()?.trim().parse().ok()?;
        let url = lines.next().unwrap_or("").trim().to_owned();
        Some((pid, url))
    }
}

impl Drop for PreviewLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

// ============================================================================
// Browser and timeout
// ============================================================================

/// Open `url` with the platform's opener. Failure is only logged.
pub fn open_browser(url: &str) {
    let cmd = if cfg!(target_os = "macos") {
        Cmd::new("open").arg(url)
    } else if cfg!(windows) {
        Cmd::new("cmd").args(["/C", "start", "", url])
    } else {
        match which::which("xdg-open") {
            Ok(opener) => Cmd::new(opener).arg(url),
            Err(_) => {
                debug!("preview"; "no browser opener found");
                return;
            }
        }
    };
    if let Err(e) = cmd.filter(&SILENT_FILTER).allow_failure(true).run() {
        log!("warning"; "failed to open browser: {:#}", e);
    }
}

/// Stop the server once it has had no clients for `timeout` and no render
/// is running. Also prunes dead clients every second.
pub fn spawn_timeout_monitor(server: Arc<DevServer>, queue: Arc<RenderQueue>, timeout: Duration) {
    thread::spawn(move || {
        while !crate::core::is_shutdown() {
            thread::sleep(Duration::from_secs(1));
            if server.has_clients() {
                server.prune();
            }
            if timeout.is_zero() {
                continue;
            }
            if server.idle_for().is_some_and(|idle| idle >= timeout) && !queue.is_rendering() {
                log!("preview"; "no clients for {}s, stopping", timeout.as_secs());
                crate::core::request_shutdown();
                break;
            }
        }
    });
}
