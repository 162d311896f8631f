use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use notify::RecursiveMode;
use tempfile::TempDir;
use tokio::runtime::Handle;

use super::debouncer::{self, Debouncer};
use super::roots::compute_roots;
use super::*;
use crate::core::BuildSession;
use crate::render::RenderObserver;

#[derive(Default)]
struct RecordingReloader {
    reloads: Mutex<Vec<Option<String>>>,
    failures: Mutex<Vec<String>>,
}

impl Reloader for RecordingReloader {
    fn reload_clients(&self, target: Option<&str>) {
        self.reloads.lock().push(target.map(str::to_owned));
    }

    fn render_failed(&self, message: &str) {
        self.failures.lock().push(message.to_owned());
    }
}

#[derive(Default)]
struct CountingObserver {
    started: AtomicUsize,
}

impl RenderObserver for CountingObserver {
    fn render_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    fn render_stopped(&self) {}
}

struct Harness {
    _dir: TempDir,
    root: PathBuf,
    handle: Arc<ProjectHandle>,
    watcher: ProjectWatcher,
    reloader: Arc<RecordingReloader>,
    observer: Arc<CountingObserver>,
}

impl Harness {
    fn renders(&self) -> usize {
        self.observer.started.load(Ordering::SeqCst)
    }

    fn reloads(&self) -> Vec<Option<String>> {
        self.reloader.reloads.lock().clone()
    }
}

fn options() -> WatchOptions {
    WatchOptions {
        watch_inputs: true,
        render_on_reload: false,
        host_presentation: false,
        navigate: true,
        flags: RenderFlags {
            quiet: true,
            ..Default::default()
        },
    }
}

fn harness(config: &str, files: &[(&str, &str)], options: WatchOptions) -> Harness {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("_quire.toml"), config).unwrap();
    for (rel, content) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    let session = BuildSession::new();
    let ctx = ProjectContext::load(dir.path(), &session).unwrap();
    let root = ctx.dir.clone();
    let handle = Arc::new(ProjectHandle::new(ctx, session));
    let observer = Arc::new(CountingObserver::default());
    let queue = Arc::new(RenderQueue::new(
        &Handle::current(),
        Some(observer.clone() as Arc<dyn crate::render::RenderObserver>),
    ));
    let reloader = Arc::new(RecordingReloader::default());
    let watcher = ProjectWatcher::new(
        Arc::clone(&handle),
        queue,
        Arc::new(RenderHashTracker::new()),
        reloader.clone() as Arc<dyn Reloader>,
        options,
    );

    Harness {
        _dir: dir,
        root,
        handle,
        watcher,
        reloader,
        observer,
    }
}

const SITE: &str = "[project]\ntype = \"website\"";

// ============================================================================
// debounce and roots
// ============================================================================

#[test]
fn test_burst_of_events_is_one_batch() {
    let mut bouncer = Debouncer::new();
    let mut batches = 0;

    for i in 0..10 {
        bouncer.add_paths([Path::new(&format!("/p/file{i}.qmd"))]);
        if bouncer.take_if_ready().is_some() {
            batches += 1;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(batches, 0);

    std::thread::sleep(Duration::from_millis(debouncer::DEBOUNCE_MS + 50));
    let batch = bouncer.take_if_ready().unwrap();
    assert_eq!(batch.len(), 10);
    assert!(bouncer.take_if_ready().is_none());
}

#[test]
fn test_editor_temp_files_are_dropped() {
    let mut debouncer = Debouncer::new();
    debouncer.add_paths([Path::new("/p/a.qmd~"), Path::new("/p/.#a.qmd"), Path::new("/p/a.swp")]);
    assert!(debouncer.paths.is_empty());
    assert!(debouncer.last_event.is_none());
}

#[test]
fn test_watch_roots() {
    let dir = TempDir::new().unwrap();
    for name in ["posts", "data", ".git", "node_modules"] {
        fs::create_dir(dir.path().join(name)).unwrap();
    }
    let roots = compute_roots(dir.path());
    assert_eq!(
        roots,
        vec![
            (dir.path().to_path_buf(), RecursiveMode::NonRecursive),
            (dir.path().join("data"), RecursiveMode::Recursive),
            (dir.path().join("posts"), RecursiveMode::Recursive),
        ]
    );

    for i in 0..31 {
        fs::create_dir(dir.path().join(format!("d{i:02}"))).unwrap();
    }
    assert_eq!(
        compute_roots(dir.path()),
        vec![(dir.path().to_path_buf(), RecursiveMode::Recursive)]
    );
}

// ============================================================================
// batch handling
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_changed_input_renders_and_navigates() {
    let h = harness(SITE, &[("posts/a.qmd", "# A")], options());
    let input = h.root.join("posts/a.qmd");

    let outcome = h.watcher.handle_batch(&[input.clone()]).await.unwrap();
    assert_eq!(
        outcome,
        BatchOutcome::Reloaded {
            target: Some("/posts/a.html".into())
        }
    );
    assert_eq!(h.renders(), 1);
    assert!(h.root.join("_site/posts/a.html").is_file());
    assert_eq!(h.reloads(), vec![Some("/posts/a.html".to_owned())]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_touched_input_with_same_content_is_ignored() {
    let h = harness(SITE, &[("a.qmd", "# A")], options());
    let input = h.root.join("a.qmd");
    h.watcher.handle_batch(&[input.clone()]).await.unwrap();
    assert_eq!(h.renders(), 1);

    fs::write(&input, "# A").unwrap();
    let outcome = h.watcher.handle_batch(&[input.clone()]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Ignored);
    assert_eq!(h.renders(), 1);
    assert_eq!(h.reloads().len(), 1);

    fs::write(&input, "# A, revised").unwrap();
    h.watcher.handle_batch(&[input]).await.unwrap();
    assert_eq!(h.renders(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_output_dir_events_never_render() {
    let h = harness(SITE, &[("a.qmd", "# A"), ("_site/a.html", "<html></html>")], options());

    let outcome = h
        .watcher
        .handle_batch(&[h.root.join("_site/a.html"), h.root.join(".quire/idx/a.qmd.json")])
        .await
        .unwrap();
    assert_eq!(outcome, BatchOutcome::Ignored);
    assert_eq!(h.renders(), 0);
    assert!(h.reloads().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deleted_input_reloads_with_full_render() {
    let h = harness(SITE, &[("a.qmd", "# A"), ("b.qmd", "# B")], options());
    let removed = h.root.join("b.qmd");
    fs::remove_file(&removed).unwrap();

    let outcome = h.watcher.handle_batch(&[removed]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
    assert_eq!(h.renders(), 1);
    assert_eq!(h.handle.get().files.input, vec![h.root.join("a.qmd")]);
    assert!(h.root.join("_site/a.html").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resource_change_reloads() {
    let h = harness(
        "[project]\ntype = \"website\"\nresources = [\"data.csv\"]",
        &[("a.qmd", "# A"), ("data.csv", "x,y")],
        options(),
    );
    fs::write(h.root.join("data.csv"), "x,y\n1,2").unwrap();

    let outcome = h.watcher.handle_batch(&[h.root.join("data.csv")]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
    assert_eq!(h.renders(), 1);
    assert!(h.root.join("_site/data.csv").is_file());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unrelated_file_is_ignored() {
    let h = harness(SITE, &[("a.qmd", "# A"), ("notes.txt", "todo")], options());
    let outcome = h.watcher.handle_batch(&[h.root.join("notes.txt")]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Ignored);
    assert!(h.reloads().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_render_on_reload_skips_full_render() {
    let h = harness(
        SITE,
        &[("a.qmd", "# A")],
        WatchOptions {
            render_on_reload: true,
            ..options()
        },
    );
    let config = h.root.join("_quire.toml");
    fs::write(&config, "[project]\ntype = \"website\"\noutput-dir = \"public\"").unwrap();

    let outcome = h.watcher.handle_batch(&[config]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
    assert_eq!(h.renders(), 0);
    assert_eq!(h.handle.get().output_dir_name(), Some("public"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rendered_pdf_is_not_reloaded_twice() {
    let h = harness("[format.pdf]", &[("a.qmd", "# A")], options());
    let input = h.root.join("a.qmd");

    let outcome = h.watcher.handle_batch(&[input]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
    let pdf = h.root.join("a.pdf");
    let mtime = get_mtime(&pdf).unwrap();
    assert!(h.watcher.covers_output(&pdf, mtime));

    // rewritten outside the watcher
    let later = mtime + Duration::from_secs(5);
    fs::File::options().write(true).open(&pdf).unwrap().set_modified(later).unwrap();
    assert!(!h.watcher.covers_output(&pdf, later));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_render_is_reported_and_watch_continues() {
    let h = harness("[engine]\ncommand = [\"false\"]", &[("a.qmd", "# A")], options());
    let input = h.root.join("a.qmd");

    let outcome = h.watcher.handle_batch(&[input.clone()]).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Failed);
    assert_eq!(h.reloader.failures.lock().len(), 1);
    assert!(h.reloads().is_empty());

    // the failed input was not recorded, so the next save retries it
    h.watcher.handle_batch(&[input]).await.unwrap();
    assert_eq!(h.renders(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_presentation_reload_left_to_host() {
    let config = "[format.revealjs]";
    let files = [("talk.qmd", "# Talk"), ("talk.html", "<html></html>")];

    let hosted = harness(
        config,
        &files,
        WatchOptions {
            watch_inputs: false,
            host_presentation: true,
            ..options()
        },
    );
    let target = hosted.root.join("talk.html");
    let outcome = hosted.watcher.reload_output(Some(target)).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Suppressed);
    assert!(hosted.reloads().is_empty());

    let standalone = harness(config, &files, options());
    let target = standalone.root.join("talk.html");
    let outcome = standalone.watcher.reload_output(Some(target)).await.unwrap();
    assert_eq!(
        outcome,
        BatchOutcome::Reloaded {
            target: Some("/talk.html".into())
        }
    );
    assert_eq!(standalone.renders(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_missing_or_unnavigable_target_reloads_in_place() {
    let h = harness(SITE, &[("a.qmd", "# A")], options());
    let outcome = h
        .watcher
        .reload_output(Some(h.root.join("_site/missing.html")))
        .await
        .unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });

    let h = harness(
        SITE,
        &[("a.qmd", "# A"), ("_site/a.html", "<html></html>")],
        WatchOptions {
            navigate: false,
            ..options()
        },
    );
    let outcome = h.watcher.reload_output(Some(h.root.join("_site/a.html"))).await.unwrap();
    assert_eq!(outcome, BatchOutcome::Reloaded { target: None });
}
