use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use volley_model::ProgressSnapshot;

const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Completion counters shared between the orchestrator and the monitor.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    completed: AtomicUsize,
    total: AtomicUsize,
}

impl ProgressTracker {
    pub fn new(total: usize) -> Self {
        Self {
            completed: AtomicUsize::new(0),
            total: AtomicUsize::new(total),
        }
    }

    pub fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::Release);
    }

    pub fn complete(&self) {
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }
}

/// Where on-demand progress reports go.
pub type ProgressSink = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

fn log_sink() -> ProgressSink {
    Arc::new(|snapshot| {
        tracing::info!(
            target: "volley::progress",
            completed = snapshot.completed,
            total = snapshot.total,
            "{snapshot}"
        );
    })
}

/// Background task that reports progress each time its trigger fires.
///
/// It only reads the tracker. Without a trigger it idles until stopped.
pub struct ProgressMonitor {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressMonitor {
    pub fn spawn(tracker: Arc<ProgressTracker>, trigger: Option<mpsc::Receiver<()>>) -> Self {
        Self::spawn_with_sink(tracker, trigger, log_sink())
    }

    pub fn spawn_with_sink(
        tracker: Arc<ProgressTracker>,
        trigger: Option<mpsc::Receiver<()>>,
        sink: ProgressSink,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let Some(mut trigger) = trigger else {
                token.cancelled().await;
                return;
            };
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    request = trigger.recv() => match request {
                        Some(()) => sink(tracker.snapshot()),
                        None => {
                            token.cancelled().await;
                            break;
                        }
                    },
                }
            }
            tracing::debug!(target: "volley::progress", "progress monitor stopped");
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Cancels the monitor and waits briefly for it to exit. Safe to call twice.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.cancel.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(target: "volley::progress", error = %err, "progress monitor task failed")
            }
            Err(_) => tracing::warn!(target: "volley::progress", "progress monitor did not stop in time"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for ProgressMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressMonitor")
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn reports_on_each_trigger() {
        let tracker = Arc::new(ProgressTracker::new(4));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |snapshot| seen.lock().push(snapshot))
        };
        let (tx, rx) = mpsc::channel(4);
        let mut monitor = ProgressMonitor::spawn_with_sink(Arc::clone(&tracker), Some(rx), sink);

        tracker.complete();
        tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tracker.complete();
        tx.send(()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running());

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].to_string(), "completed: 50.00% (2/4)");
    }

    #[tokio::test]
    async fn monitor_without_trigger_stops_cleanly() {
        let tracker = Arc::new(ProgressTracker::new(0));
        let mut monitor = ProgressMonitor::spawn(tracker, None);
        monitor.stop().await;
        assert!(!monitor.is_running());
    }

    #[tokio::test]
    async fn dropping_monitor_ends_its_task() {
        let tracker = Arc::new(ProgressTracker::new(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressSink = {
            let seen = Arc::clone(&seen);
            Arc::new(move |snapshot| seen.lock().push(snapshot))
        };
        let (_tx, rx) = mpsc::channel(1);
        let monitor = ProgressMonitor::spawn_with_sink(tracker, Some(rx), sink);
        assert_eq!(Arc::strong_count(&seen), 2);

        drop(monitor);
        tokio::time::timeout(Duration::from_secs(1), async {
            while Arc::strong_count(&seen) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("monitor task should release its sink");
    }
}
