//! Debounced re-aggregation.
//!
//! Change notifications carry no payload and may arrive in bursts. The debouncer
//! waits for a quiet period after the last one, then runs the job once on the
//! blocking pool and publishes the result on a `watch` channel. Notifications that
//! arrive while a job runs collapse into a single follow-up run.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Default quiet period before a burst of notifications triggers a run.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1500);

/// Cloneable, synchronous handle for signalling a change.
#[derive(Debug, Clone)]
pub struct DebounceNotifier {
    tx: mpsc::Sender<()>,
}

impl DebounceNotifier {
    /// Signal a change. Never blocks; a run already pending absorbs the signal.
    pub fn notify(&self) {
        // Full means a notification is already queued; Closed means shutdown.
        let _ = self.tx.try_send(());
    }
}

/// Runs a job after notifications settle.
#[derive(Debug)]
pub struct Debouncer<T> {
    notifier: DebounceNotifier,
    results: watch::Receiver<Option<Arc<T>>>,
    runs: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> Debouncer<T> {
    /// Start the debouncer task.
    pub fn spawn<F>(quiet: Duration, job: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<()>(1);
        let (result_tx, results) = watch::channel(None);
        let runs = Arc::new(AtomicU64::new(0));
        let job = Arc::new(job);
        let task_runs = Arc::clone(&runs);

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let mut closed = false;
                loop {
                    match tokio::time::timeout(quiet, rx.recv()).await {
                        Ok(Some(())) => {}
                        Ok(None) => {
                            closed = true;
                            break;
                        }
                        Err(_) => break,
                    }
                }

                let job = Arc::clone(&job);
                match tokio::task::spawn_blocking(move || job()).await {
                    Ok(value) => {
                        task_runs.fetch_add(1, Ordering::Relaxed);
                        result_tx.send_replace(Some(Arc::new(value)));
                    }
                    Err(e) => tracing::warn!(error = %e, "Debounced job failed"),
                }

                if closed {
                    break;
                }
            }
            tracing::debug!("Debouncer stopped");
        });

        Self {
            notifier: DebounceNotifier { tx },
            results,
            runs,
            task,
        }
    }

    /// Signal a change.
    pub fn notify(&self) {
        self.notifier.notify();
    }

    /// A handle that can be moved into callbacks (e.g. a filesystem watcher).
    #[must_use]
    pub fn notifier(&self) -> DebounceNotifier {
        self.notifier.clone()
    }

    /// Receiver that sees every published result.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<T>>> {
        self.results.clone()
    }

    /// Most recent result, if any run has finished.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<T>> {
        self.results.borrow().clone()
    }

    /// Number of completed runs.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
