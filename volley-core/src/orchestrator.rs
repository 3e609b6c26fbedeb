use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::{FutureExt, future::join_all};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use volley_contracts::{JobContext, ModulePlugin, PersistenceStore, PluginError, ProtocolPlugin};
use volley_model::{JitterWindow, JobOutcome, JobReport, RunReport, SessionConfig, Target};

use crate::{
    callback::CallbackHandle,
    error::Result,
    jitter::JitterSource,
    pool::{WorkResult, WorkerPool, panic_message},
    progress::{ProgressMonitor, ProgressSink, ProgressTracker},
};

/// One unit of work: a protocol run against a single target.
#[derive(Clone)]
pub struct Job {
    pub target: Target,
    pub protocol: Arc<dyn ProtocolPlugin>,
    pub jitter: Option<JitterWindow>,
    pub timeout: Option<Duration>,
}

impl Job {
    /// One job per target, in target order, with the session's jitter and timeout.
    pub fn for_targets(
        targets: impl IntoIterator<Item = Target>,
        protocol: &Arc<dyn ProtocolPlugin>,
        config: &SessionConfig,
    ) -> Vec<Job> {
        targets
            .into_iter()
            .map(|target| Job {
                target,
                protocol: Arc::clone(protocol),
                jitter: config.jitter,
                timeout: config.timeout,
            })
            .collect()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("target", &self.target)
            .field("protocol", &self.protocol.name())
            .field("jitter", &self.jitter)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Drives a batch of jobs through the worker pool and tears the run down.
///
/// Jitter sleeps, timeouts and cancellation live on the async side; protocol
/// code runs on pool threads. A timeout only stops the wait: the worker keeps
/// its slot until the plugin returns, though its job token is cancelled so a
/// plugin polling [`JobContext::is_cancelled`] can return early.
pub struct ScanOrchestrator {
    store: Arc<dyn PersistenceStore>,
    module: Option<Arc<dyn ModulePlugin>>,
    callback: Option<CallbackHandle>,
    jitter: JitterSource,
    progress: Arc<ProgressTracker>,
    progress_trigger: Option<mpsc::Receiver<()>>,
    progress_sink: Option<ProgressSink>,
    cancel: CancellationToken,
}

impl ScanOrchestrator {
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            module: None,
            callback: None,
            jitter: JitterSource::default(),
            progress: Arc::new(ProgressTracker::default()),
            progress_trigger: None,
            progress_sink: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_module(mut self, module: Option<Arc<dyn ModulePlugin>>) -> Self {
        self.module = module;
        self
    }

    /// Hands over a started callback server. The run stops it during teardown.
    pub fn with_callback(mut self, callback: Option<CallbackHandle>) -> Self {
        self.callback = callback;
        self
    }

    pub fn with_jitter_source(mut self, jitter: JitterSource) -> Self {
        self.jitter = jitter;
        self
    }

    /// Each message on `trigger` makes the progress monitor report once.
    pub fn with_progress_trigger(mut self, trigger: mpsc::Receiver<()>) -> Self {
        self.progress_trigger = Some(trigger);
        self
    }

    pub fn with_progress_sink(mut self, sink: ProgressSink) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that aborts the whole run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn progress(&self) -> Arc<ProgressTracker> {
        Arc::clone(&self.progress)
    }

    /// Runs every job and returns one outcome per job, in submission order.
    ///
    /// Only pool allocation can fail the run. Teardown runs exactly once on
    /// every path, including that failure and a panic in the dispatch loop.
    /// If the returned future is dropped before it completes, teardown is
    /// spawned onto the current runtime instead.
    pub async fn run(mut self, jobs: Vec<Job>, config: Arc<SessionConfig>) -> Result<RunReport> {
        let started = Instant::now();
        self.progress.set_total(jobs.len());

        let monitor = match self.progress_sink.take() {
            Some(sink) => ProgressMonitor::spawn_with_sink(
                self.progress(),
                self.progress_trigger.take(),
                sink,
            ),
            None => ProgressMonitor::spawn(self.progress(), self.progress_trigger.take()),
        };
        let run_token = self.cancel.child_token();
        let mut teardown = Teardown::new(TeardownParts {
            monitor,
            store: Arc::clone(&self.store),
            callback: self.callback.take(),
            pool: None,
            grace: config.drain_grace,
            run_token: run_token.clone(),
        });

        match WorkerPool::new(config.pool_size) {
            Ok(pool) => teardown.attach_pool(pool),
            Err(err) => {
                tracing::error!(target: "volley::orchestrator", error = %err, "cannot allocate worker pool");
                teardown.run().await;
                return Err(err);
            }
        }

        let callback_url = teardown.callback().map(CallbackHandle::endpoint);
        let dispatched = match teardown.pool() {
            Some(pool) => {
                tracing::info!(
                    target: "volley::orchestrator",
                    jobs = jobs.len(),
                    pool_size = pool.size(),
                    protocol = %config.protocol,
                    "starting run"
                );
                let dispatch = Dispatch {
                    pool,
                    config: &config,
                    store: &self.store,
                    module: self.module.as_ref(),
                    callback_url: callback_url.as_deref(),
                    jitter: &self.jitter,
                    progress: &self.progress,
                    cancel: &run_token,
                };
                AssertUnwindSafe(dispatch.run_all(jobs)).catch_unwind().await
            }
            None => Ok(Vec::new()),
        };

        let drained = teardown.run().await;

        let jobs = match dispatched {
            Ok(jobs) => jobs,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        let report = RunReport {
            jobs,
            cancelled: self.cancel.is_cancelled(),
            elapsed: started.elapsed(),
        };

        tracing::info!(
            target: "volley::orchestrator",
            summary = %report.summary(),
            cancelled = report.cancelled,
            drained,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "run finished"
        );
        Ok(report)
    }
}

impl fmt::Debug for ScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanOrchestrator")
            .field("has_module", &self.module.is_some())
            .field("callback", &self.callback)
            .field("progress", &self.progress.snapshot())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Resources released at the end of a run.
///
/// Consumed by [`Teardown::run`]. Dropping it unconsumed, which happens when
/// the run future is dropped, cancels the run's jobs and spawns the same
/// teardown onto the current runtime.
struct Teardown {
    parts: Option<TeardownParts>,
}

struct TeardownParts {
    monitor: ProgressMonitor,
    store: Arc<dyn PersistenceStore>,
    callback: Option<CallbackHandle>,
    pool: Option<WorkerPool>,
    grace: Duration,
    run_token: CancellationToken,
}

impl Teardown {
    fn new(parts: TeardownParts) -> Self {
        Self { parts: Some(parts) }
    }

    fn attach_pool(&mut self, pool: WorkerPool) {
        if let Some(parts) = self.parts.as_mut() {
            parts.pool = Some(pool);
        }
    }

    fn pool(&self) -> Option<&WorkerPool> {
        self.parts.as_ref().and_then(|parts| parts.pool.as_ref())
    }

    fn callback(&self) -> Option<&CallbackHandle> {
        self.parts.as_ref().and_then(|parts| parts.callback.as_ref())
    }

    /// Returns whether the pool drained within the grace period.
    async fn run(mut self) -> bool {
        match self.parts.take() {
            Some(parts) => parts.release().await,
            None => true,
        }
    }
}

impl Drop for Teardown {
    fn drop(&mut self) {
        let Some(parts) = self.parts.take() else {
            return;
        };
        parts.run_token.cancel();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!(target: "volley::orchestrator", "run dropped before completion, tearing down in background");
                runtime.spawn(async move {
                    parts.release().await;
                });
            }
            Err(_) => {
                tracing::error!(target: "volley::orchestrator", "run dropped outside a runtime, store was not shut down");
            }
        }
    }
}

impl TeardownParts {
    /// Stop monitor, shut the store down, stop the callback server, drain the pool.
    async fn release(mut self) -> bool {
        self.monitor.stop().await;

        if let Err(err) = self.store.shutdown().await {
            tracing::warn!(target: "volley::orchestrator", error = %err, "store shutdown failed");
        }

        if let Some(mut callback) = self.callback.take() {
            callback.stop().await;
        }

        match self.pool.take() {
            Some(pool) => pool.drain(self.grace).await,
            None => true,
        }
    }
}

struct Dispatch<'a> {
    pool: &'a WorkerPool,
    config: &'a Arc<SessionConfig>,
    store: &'a Arc<dyn PersistenceStore>,
    module: Option<&'a Arc<dyn ModulePlugin>>,
    callback_url: Option<&'a str>,
    jitter: &'a JitterSource,
    progress: &'a ProgressTracker,
    cancel: &'a CancellationToken,
}

type JobResult = WorkResult<std::result::Result<(), PluginError>>;

impl Dispatch<'_> {
    async fn run_all(&self, jobs: Vec<Job>) -> Vec<JobReport> {
        join_all(
            jobs.into_iter()
                .enumerate()
                .map(|(index, job)| self.run_job(index, job)),
        )
        .await
    }

    async fn run_job(&self, index: usize, job: Job) -> JobReport {
        let start_delay = self.jitter.sample(job.jitter.as_ref());
        let outcome = self.execute(&job, start_delay).await;
        self.progress.complete();

        match &outcome {
            JobOutcome::Success => {
                tracing::debug!(target: "volley::orchestrator", host = %job.target, "job succeeded")
            }
            JobOutcome::Timeout => {
                tracing::warn!(target: "volley::orchestrator", host = %job.target, "job timed out")
            }
            JobOutcome::Cancelled => {
                tracing::debug!(target: "volley::orchestrator", host = %job.target, "job cancelled")
            }
            JobOutcome::Error(reason) => {
                tracing::info!(target: "volley::orchestrator", host = %job.target, reason = %reason, "job failed")
            }
        }

        JobReport {
            index,
            target: job.target,
            outcome,
            start_delay,
        }
    }

    async fn execute(&self, job: &Job, start_delay: Duration) -> JobOutcome {
        if self.cancel.is_cancelled() {
            return JobOutcome::Cancelled;
        }
        if !start_delay.is_zero() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return JobOutcome::Cancelled,
                _ = tokio::time::sleep(start_delay) => {}
            }
        }

        let job_token = self.cancel.child_token();
        let result = self.submit(job, job_token.clone());

        let outcome = tokio::select! {
            biased;
            waited = wait_for(result, job.timeout) => waited,
            _ = self.cancel.cancelled() => JobOutcome::Cancelled,
        };
        if matches!(outcome, JobOutcome::Timeout | JobOutcome::Cancelled) {
            job_token.cancel();
        }
        outcome
    }

    fn submit(&self, job: &Job, token: CancellationToken) -> oneshot::Receiver<JobResult> {
        let config = Arc::clone(self.config);
        let store = Arc::clone(self.store);
        let module = self.module.cloned();
        let callback_url = self.callback_url.map(str::to_string);
        let protocol = Arc::clone(&job.protocol);
        let target = job.target.clone();

        self.pool.submit(move || {
            // Queued work that outlived its wait never starts.
            if token.is_cancelled() {
                return Err(PluginError::Cancelled);
            }
            let ctx = JobContext::new(&config, store.as_ref(), &target, &token)
                .with_module(module.as_deref())
                .with_callback_url(callback_url.as_deref());
            protocol.execute(&ctx)
        })
    }
}

async fn wait_for(result: oneshot::Receiver<JobResult>, timeout: Option<Duration>) -> JobOutcome {
    let received = match timeout {
        Some(limit) => match tokio::time::timeout(limit, result).await {
            Ok(received) => received,
            Err(_) => return JobOutcome::Timeout,
        },
        None => result.await,
    };

    match received {
        Ok(Ok(Ok(()))) => JobOutcome::Success,
        Ok(Ok(Err(PluginError::Cancelled))) => JobOutcome::Cancelled,
        Ok(Ok(Err(err))) => JobOutcome::Error(err.to_string()),
        Ok(Err(panic)) => {
            JobOutcome::Error(format!("worker panicked: {}", panic_message(panic.as_ref())))
        }
        Err(_) => JobOutcome::Error("worker dropped its result".to_string()),
    }
}
