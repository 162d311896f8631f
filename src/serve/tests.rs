use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use super::*;
use crate::serve::watch::{BatchOutcome, Reloader};

const SITE: &str = "[project]\ntype = \"website\"";

fn project(config: &str, files: &[(&str, &str)]) -> (TempDir, ProjectContext) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("_quire.toml"), config).unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    let ctx = ProjectContext::load(dir.path(), &BuildSession::new()).unwrap();
    (dir, ctx)
}

fn set_mtime(path: &Path, time: SystemTime) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(time)
        .unwrap();
}

/// A preview state over a temporary project, without watcher or browser.
struct Preview {
    _dir: TempDir,
    root: PathBuf,
    state: Arc<PreviewState>,
    _runtime: tokio::runtime::Runtime,
}

impl Preview {
    fn new(config: &str, files: &[(&str, &str)]) -> Self {
        let (dir, ctx) = project(config, files);
        let root = ctx.dir.clone();
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let state = Arc::new(PreviewState {
            handle: Arc::new(ProjectHandle::new(ctx, BuildSession::new())),
            queue: Arc::new(RenderQueue::new(runtime.handle(), None)),
            tracker: Arc::new(RenderHashTracker::new()),
            server: DevServer::new(),
            flags: RenderFlags::default(),
        });
        Self {
            _dir: dir,
            root,
            state,
            _runtime: runtime,
        }
    }

    /// Send one GET through a real listener and return (status, body).
    fn get(&self, url: &str) -> (u16, String) {
        let http = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = http.server_addr().to_ip().unwrap();
        let state = Arc::clone(&self.state);
        let worker = thread::spawn(move || {
            let request = http.recv().unwrap();
            handle_request(request, &state).unwrap();
        });

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(30))).unwrap();
        write!(stream, "GET {url} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
        let mut raw = String::new();
        stream.read_to_string(&mut raw).unwrap();
        worker.join().unwrap();

        let status = raw.split(' ').nth(1).unwrap().parse().unwrap();
        let body = raw.split_once("\r\n\r\n").map(|(_, b)| b.to_owned()).unwrap_or_default();
        (status, body)
    }
}

#[test]
fn test_initial_render_parse() {
    assert_eq!(InitialRender::parse("none"), InitialRender::None);
    assert_eq!(InitialRender::parse("default"), InitialRender::Default);
    assert_eq!(InitialRender::parse("all"), InitialRender::Default);
    assert_eq!(InitialRender::parse("pdf"), InitialRender::Format("pdf".into()));
}

#[test]
fn test_stale_inputs() {
    let (_dir, ctx) = project(
        SITE,
        &[("a.qmd", "# A"), ("b.qmd", "# B"), ("c.qmd", "# C"), ("_site/a.html", "a"), ("_site/b.html", "b")],
    );
    let past = SystemTime::now() - Duration::from_secs(3600);
    set_mtime(&ctx.dir.join("a.qmd"), past);
    set_mtime(&ctx.dir.join("_site/b.html"), past);

    // a is current, b's output is older than the input, c was never rendered
    let stale = stale_inputs(&ctx);
    assert_eq!(stale, vec![ctx.dir.join("b.qmd"), ctx.dir.join("c.qmd")]);
}

#[test]
fn test_render_on_request_injects_client() {
    let preview = Preview::new(SITE, &[("posts/a.qmd", "# A")]);
    let output = preview.root.join("_site/posts/a.html");
    assert!(!output.exists());

    let (status, body) = preview.get("/posts/a.html");
    assert_eq!(status, 200);
    assert!(output.is_file());
    assert!(body.contains("/quire-preview.js"));
    assert!(body.contains(r#"inputFile: "posts/a.qmd""#));

    // recorded now: the next request serves the file as is
    let ctx = preview.state.handle.get();
    assert!(!preview.state.tracker.file_requires_rerender(
        &output,
        &preview.root.join("posts/a.qmd"),
        &preview.state.tracker.resources_for(&output),
        &ctx
    ));
}

#[test]
fn test_request_renders_stale_page_behind_busy_queue() {
    let preview = Preview::new(SITE, &[("b.qmd", "# B original")]);
    let (status, body) = preview.get("/b.html");
    assert_eq!(status, 200);
    assert!(body.contains("# B original"));

    fs::write(preview.root.join("b.qmd"), "# B edited").unwrap();
    let busy = preview
        .state
        .queue
        .enqueue(|| thread::sleep(Duration::from_secs(1)))
        .unwrap();
    assert!(preview.state.queue.is_rendering());

    let (status, body) = preview.get("/b.html");
    assert_eq!(status, 200);
    assert!(body.contains("# B edited"));
    assert!(!body.contains("# B original"));
    busy.blocking_recv().unwrap();
}

#[derive(Default)]
struct RenderCount(AtomicUsize);

impl RenderObserver for RenderCount {
    fn render_started(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn render_stopped(&self) {}
}

#[test]
fn test_watch_options_follow_output_format() {
    let (_dir, ctx) = project(SITE, &[("a.qmd", "# A")]);
    assert!(watch_options(&ctx, &PreviewOptions::default(), true).render_on_reload);

    let pdf = PreviewOptions {
        render: InitialRender::Format("pdf".into()),
        ..Default::default()
    };
    assert!(!watch_options(&ctx, &pdf, true).render_on_reload);

    let (_dir, ctx) = project("[format.pdf]\n[format.html]", &[("a.qmd", "# A")]);
    assert!(!watch_options(&ctx, &PreviewOptions::default(), true).render_on_reload);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pdf_preview_renders_project_on_config_change() {
    let (_dir, ctx) = project("[format.pdf]", &[("a.qmd", "# A")]);
    let root = ctx.dir.clone();
    let watch = watch_options(&ctx, &PreviewOptions::default(), true);

    let count = Arc::new(RenderCount::default());
    let queue = Arc::new(RenderQueue::new(
        &tokio::runtime::Handle::current(),
        Some(count.clone() as Arc<dyn RenderObserver>),
    ));
    let watcher = ProjectWatcher::new(
        Arc::new(ProjectHandle::new(ctx, BuildSession::new())),
        queue,
        Arc::new(RenderHashTracker::new()),
        DevServer::new() as Arc<dyn Reloader>,
        watch,
    );

    let config = root.join("_quire.toml");
    fs::write(&config, "[format.pdf]\n").unwrap();
    let outcome = watcher.handle_batch(&[config]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
    assert_eq!(count.0.load(Ordering::SeqCst), 1);
    assert!(root.join("a.pdf").is_file());
}

#[cfg(unix)]
#[test]
fn test_failed_render_on_request_shows_error() {
    let preview = Preview::new("[engine]\ncommand = [\"false\"]", &[("a.qmd", "# A")]);
    let (status, body) = preview.get("/a.html");
    assert_eq!(status, 500);
    assert!(body.contains("quire-render-error"));
    assert!(body.contains("a.qmd"));
}

#[test]
fn test_stored_render_error_replaces_pages() {
    let preview = Preview::new(SITE, &[("a.qmd", "# A"), ("_site/style.css", "p {}")]);
    preview.state.server.render_failed("engine exited with status 1");

    let (status, body) = preview.get("/a.html");
    assert_eq!(status, 500);
    assert!(body.contains("engine exited with status 1"));

    // assets are still served
    let (status, body) = preview.get("/style.css");
    assert_eq!(status, 200);
    assert_eq!(body, "p {}");

    preview.state.server.reload_clients(None);
    assert_eq!(preview.get("/a.html").0, 200);
}

#[test]
fn test_client_script_and_not_found() {
    let preview = Preview::new(SITE, &[("a.qmd", "# A")]);

    let (status, body) = preview.get(PREVIEW_JS_PATH);
    assert_eq!(status, 200);
    assert!(body.contains("WebSocket"));

    assert_eq!(preview.get("/missing.png").0, 404);
    assert_eq!(preview.get("/../_quire.toml").0, 404);
}
