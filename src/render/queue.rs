//! Single-flight FIFO render queue.
//!
//! Every render, whatever triggered it, runs through one worker task, so
//! at most one render-and-relocate cycle touches the project at a time.
//! Task bodies are blocking code and run on tokio's blocking pool.
//!
//! ```text
//! CLI / preview request / watcher
//!        │ enqueue / submit
//!        ▼
//!   mpsc (FIFO) ──► worker ──► spawn_blocking(task) ──► oneshot ──► caller
//!                     │
//!                     └─ RenderObserver::{render_started, render_stopped}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::debug;

/// Notified around each queued task (e.g. a "rendering" indicator).
pub trait RenderObserver: Send + Sync {
    fn render_started(&self);
    fn render_stopped(&self);
}

type Job = Box<dyn FnOnce() + Send>;

pub struct RenderQueue {
    tx: mpsc::UnboundedSender<Job>,
    /// Queued plus running tasks.
    pending: Arc<AtomicUsize>,
}

impl RenderQueue {
    /// Start the worker on `handle`.
    pub fn new(handle: &Handle, observer: Option<Arc<dyn RenderObserver>>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let pending = Arc::new(AtomicUsize::new(0));

        let worker_pending = Arc::clone(&pending);
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Some(observer) = &observer {
                    observer.render_started();
                }
                if tokio::task::spawn_blocking(job).await.is_err() {
                    debug!("render"; "render task panicked");
                }
                worker_pending.fetch_sub(1, Ordering::SeqCst);
                if let Some(observer) = &observer {
                    observer.render_stopped();
                }
            }
        });

        Self { tx, pending }
    }

    /// Queue `task` and return a receiver for its result.
    pub fn enqueue<T, F>(&self, task: F) -> Result<oneshot::Receiver<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // the submitter may have gone away; the render still counts
            let _ = result_tx.send(task());
        });

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            bail!("render queue is closed");
        }
        Ok(result_rx)
    }

    /// Queue `task` and wait for its result.
    pub async fn submit<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(task)?
            .await
            .map_err(|_| anyhow!("render task failed before producing a result"))
    }

    /// [`Self::submit`] for synchronous callers outside the runtime.
    pub fn submit_blocking<T, F>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.enqueue(task)?
            .blocking_recv()
            .map_err(|_| anyhow!("render task failed before producing a result"))
    }

    /// Whether a task is running or waiting.
    pub fn is_rendering(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingObserver {
        started: AtomicUsize,
        stopped: AtomicUsize,
    }

    impl RenderObserver for CountingObserver {
        fn render_started(&self) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        fn render_stopped(&self) {
            self.stopped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tasks_never_overlap_and_run_in_order() {
        let queue = Arc::new(RenderQueue::new(&Handle::current(), None));
        let intervals = Arc::new(Mutex::new(Vec::new()));

        let mut receivers = Vec::new();
        for i in 0..8 {
            let intervals = Arc::clone(&intervals);
            receivers.push(
                queue
                    .enqueue(move || {
                        let start = Instant::now();
                        std::thread::sleep(Duration::from_millis(10));
                        intervals.lock().push((i, start, Instant::now()));
                        i
                    })
                    .unwrap(),
            );
        }
        for (i, rx) in receivers.into_iter().enumerate() {
            assert_eq!(rx.await.unwrap(), i);
        }

        let intervals = intervals.lock();
        let order: Vec<_> = intervals.iter().map(|(i, _, _)| *i).collect();
        assert_eq!(order, (0..8).collect::<Vec<_>>());
        for pair in intervals.windows(2) {
            assert!(pair[0].2 <= pair[1].1, "tasks overlapped");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_errors_and_panics_do_not_stop_the_queue() {
        let queue = RenderQueue::new(&Handle::current(), None);

        let failed: Result<()> = queue.submit(|| Err(anyhow!("engine failed"))).await.unwrap();
        assert_eq!(failed.unwrap_err().to_string(), "engine failed");

        let panicked = queue.submit(|| -> u32 { panic!("boom") }).await;
        assert!(panicked.is_err());

        assert_eq!(queue.submit(|| 42).await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_is_rendering_and_observer() {
        let observer = Arc::new(CountingObserver::default());
        let queue = RenderQueue::new(&Handle::current(), Some(observer.clone() as Arc<dyn RenderObserver>));
        assert!(!queue.is_rendering());

        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let rx = queue
            .enqueue(move || {
                release_rx.recv().ok();
            })
            .unwrap();
        assert!(queue.is_rendering());

        release_tx.send(()).unwrap();
        rx.await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while queue.is_rendering() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!queue.is_rendering());
        assert_eq!(observer.started.load(Ordering::SeqCst), 1);
        assert_eq!(observer.stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_blocking_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let queue = RenderQueue::new(runtime.handle(), None);
        let value = std::thread::spawn(move || queue.submit_blocking(|| "done"))
            .join()
            .unwrap()
            .unwrap();
        assert_eq!(value, "done");
    }
}
