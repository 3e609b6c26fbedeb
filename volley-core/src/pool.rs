use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Notify, oneshot};

use crate::error::{OrchestratorError, Result};

/// Result of a unit of work, with panics caught at the worker boundary.
pub type WorkResult<T> = std::thread::Result<T>;

/// Fixed-capacity pool of OS threads for blocking plugin code.
///
/// Work beyond capacity queues inside the pool. The scheduler side only ever
/// holds a oneshot receiver per submission, so it can stop waiting on a job
/// at any point without touching the thread that runs it.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    size: usize,
    in_flight: Arc<InFlight>,
}

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

struct InFlightGuard(Arc<InFlight>);

impl InFlightGuard {
    fn enter(in_flight: &Arc<InFlight>) -> Self {
        in_flight.count.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(in_flight))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(OrchestratorError::PoolAllocation(
                "pool size must be at least 1".to_string(),
            ));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(size)
            .thread_name(|idx| format!("volley-worker-{idx}"))
            .build()
            .map_err(|err| OrchestratorError::PoolAllocation(err.to_string()))?;

        Ok(Self {
            pool,
            size,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Submitted work that has not returned yet, queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Queues `work` on the pool and returns a handle resolving to its result.
    ///
    /// Dropping the receiver does not stop the work.
    pub fn submit<F, T>(&self, work: F) -> oneshot::Receiver<WorkResult<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let guard = InFlightGuard::enter(&self.in_flight);
        self.pool.spawn(move || {
            let result = catch_unwind(AssertUnwindSafe(work));
            // Release the slot before waking the scheduler so drain sees it.
            drop(guard);
            let _ = tx.send(result);
        });
        rx
    }

    /// Waits up to `grace` for all submitted work to return, then releases the pool.
    ///
    /// Returns `true` when the pool went idle in time. Threads still running
    /// plugin code after the grace period are left to finish on their own.
    pub async fn drain(self, grace: Duration) -> bool {
        let in_flight = Arc::clone(&self.in_flight);
        let drained = tokio::time::timeout(grace, async move {
            loop {
                let idle = in_flight.idle.notified();
                if in_flight.count.load(Ordering::Acquire) == 0 {
                    break;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if !drained {
            tracing::warn!(
                target: "volley::orchestrator",
                still_running = self.in_flight(),
                grace_ms = grace.as_millis() as u64,
                "worker pool did not drain within grace period"
            );
        }
        drained
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Best-effort message out of a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sized_pool_is_rejected() {
        assert!(matches!(
            WorkerPool::new(0),
            Err(OrchestratorError::PoolAllocation(_))
        ));
    }

    #[tokio::test]
    async fn submit_returns_worker_result() {
        let pool = WorkerPool::new(2).unwrap();
        let rx = pool.submit(|| 6 * 7);
        assert_eq!(rx.await.unwrap().unwrap(), 42);
        assert!(pool.drain(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn panics_are_caught_at_the_worker_boundary() {
        let pool = WorkerPool::new(1).unwrap();
        let rx = pool.submit(|| -> u8 { panic!("probe exploded") });
        let payload = rx.await.unwrap().unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "probe exploded");

        // The thread survives and keeps serving work.
        let rx = pool.submit(|| "still alive");
        assert_eq!(rx.await.unwrap().unwrap(), "still alive");
    }

    #[tokio::test]
    async fn drain_gives_up_after_grace() {
        let pool = WorkerPool::new(1).unwrap();
        let _rx = pool.submit(|| std::thread::sleep(Duration::from_millis(800)));
        let started = std::time::Instant::now();
        assert!(!pool.drain(Duration::from_millis(50)).await);
        assert!(started.elapsed() < Duration::from_millis(700));
    }
}
