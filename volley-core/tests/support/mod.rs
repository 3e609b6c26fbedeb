#![allow(dead_code)]

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use volley_contracts::{HostRecord, JobContext, PersistenceError, PersistenceStore, PluginError, ProtocolPlugin};
use volley_core::Job;
use volley_model::{SessionConfig, Target};

mock! {
    pub Store {}

    #[async_trait]
    impl PersistenceStore for Store {
        fn record(&self, record: HostRecord) -> Result<(), PersistenceError>;
        async fn shutdown(&self) -> Result<(), PersistenceError>;
    }
}

/// Store mock that accepts any records and must be shut down exactly once.
pub fn store_shut_down_once() -> Arc<dyn PersistenceStore> {
    let mut store = MockStore::new();
    store.expect_record().returning(|_| Ok(()));
    store.expect_shutdown().times(1).returning(|| Ok(()));
    Arc::new(store)
}

/// Protocol whose behaviour is picked by the target name:
///
/// - `sleep:<ms>` blocks without looking at the cancel token
/// - `hold` blocks until the job token is cancelled
/// - `fail` returns an error, `panic` panics
/// - anything else succeeds and records `reachable`
#[derive(Debug, Default)]
pub struct Scripted {
    pub executed: AtomicUsize,
    pub finished: AtomicUsize,
    pub observed_cancel: AtomicUsize,
}

impl Scripted {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Jobs whose plugin call has returned, whatever the result.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn observed_cancel(&self) -> usize {
        self.observed_cancel.load(Ordering::SeqCst)
    }
}

impl ProtocolPlugin for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn execute(&self, ctx: &JobContext<'_>) -> Result<(), PluginError> {
        self.executed.fetch_add(1, Ordering::SeqCst);
        let result = self.script(ctx);
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

impl Scripted {
    fn script(&self, ctx: &JobContext<'_>) -> Result<(), PluginError> {
        let target = ctx.target().as_str();

        if let Some(ms) = target.strip_prefix("sleep:") {
            let ms = ms.parse().map_err(|_| PluginError::failed("bad sleep"))?;
            thread::sleep(Duration::from_millis(ms));
            return Ok(());
        }

        match target {
            "hold" => {
                let deadline = Instant::now() + Duration::from_secs(30);
                while Instant::now() < deadline {
                    if ctx.is_cancelled() {
                        self.observed_cancel.fetch_add(1, Ordering::SeqCst);
                        return Err(PluginError::Cancelled);
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            }
            "fail" => Err(PluginError::failed("connection refused")),
            "panic" => panic!("scripted panic"),
            _ => {
                ctx.record("reachable", json!({ "scripted": true }));
                Ok(())
            }
        }
    }
}

pub fn jobs(
    protocol: &Arc<Scripted>,
    config: &SessionConfig,
    targets: &[&str],
) -> Vec<Job> {
    let protocol: Arc<dyn ProtocolPlugin> = protocol.clone();
    Job::for_targets(
        targets.iter().map(|target| Target::from(*target)),
        &protocol,
        config,
    )
}

pub fn config(pool_size: usize) -> SessionConfig {
    SessionConfig::new("default", "scripted")
        .with_pool_size(pool_size)
        .with_drain_grace(Duration::from_millis(500))
}
