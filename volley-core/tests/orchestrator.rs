//! Run semantics: one outcome per job, jitter bounds, timeouts, cancellation and teardown.

mod support;

use std::{
    net::TcpStream as StdStream,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use volley_contracts::{ModulePlugin, PersistenceError};
use volley_core::{
    CallbackServer, CallbackState, JitterSource, MemoryStore, OrchestratorError, ScanOrchestrator,
    plugins::Canary,
};
use volley_model::{JitterWindow, JobOutcome, ServerBinding, ServerKind};

use support::{MockStore, Scripted, config, jobs, store_shut_down_once};

#[tokio::test]
async fn every_target_gets_exactly_one_outcome() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(6).with_timeout(Some(Duration::from_secs(30))));
    let targets = ["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5"];

    let store = Arc::new(MemoryStore::new());
    let orchestrator = ScanOrchestrator::new(store.clone());
    let progress = orchestrator.progress();
    let report = orchestrator
        .run(jobs(&protocol, &config, &targets), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.len(), 5);
    assert!(report.jobs.iter().all(|job| job.outcome == JobOutcome::Success));
    for (index, job) in report.jobs.iter().enumerate() {
        assert_eq!(job.index, index);
        assert_eq!(job.target.as_str(), targets[index]);
        assert_eq!(job.start_delay, Duration::ZERO);
    }
    assert!(!report.cancelled);
    assert_eq!(progress.snapshot().percentage(), 100.0);
    assert_eq!(store.records().len(), 5);
    assert_eq!(store.shutdown_count(), 1);
}

#[tokio::test]
async fn outcome_count_does_not_depend_on_pool_size() {
    let targets: Vec<String> = (0..40).map(|i| format!("host-{i}")).collect();
    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();

    for pool_size in [1, 3, 64] {
        let protocol = Scripted::shared();
        let config = Arc::new(config(pool_size));
        let report = ScanOrchestrator::new(store_shut_down_once())
            .run(jobs(&protocol, &config, &targets), config)
            .await
            .expect("run should succeed");
        assert_eq!(report.len(), targets.len(), "pool size {pool_size}");
        assert_eq!(report.summary().success, targets.len());
        assert_eq!(protocol.executed(), targets.len());
    }
}

#[tokio::test]
async fn errors_and_panics_stay_with_their_job() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(2));
    let report = ScanOrchestrator::new(store_shut_down_once())
        .run(jobs(&protocol, &config, &["a", "fail", "panic", "b"]), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.outcome_for("a"), Some(&JobOutcome::Success));
    assert_eq!(
        report.outcome_for("fail"),
        Some(&JobOutcome::Error("connection refused".into()))
    );
    match report.outcome_for("panic") {
        Some(JobOutcome::Error(reason)) => assert!(reason.starts_with("worker panicked")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(report.outcome_for("b"), Some(&JobOutcome::Success));
}

#[tokio::test(start_paused = true)]
async fn jitter_delays_stay_inside_window() {
    let protocol = Scripted::shared();
    let window = JitterWindow::new(1, 5).unwrap();
    let config = Arc::new(config(4).with_jitter(Some(window)));
    let targets: Vec<String> = (0..25).map(|i| format!("10.1.0.{i}")).collect();
    let targets: Vec<&str> = targets.iter().map(String::as_str).collect();

    let report = ScanOrchestrator::new(Arc::new(MemoryStore::new()))
        .with_jitter_source(JitterSource::seeded(99))
        .run(jobs(&protocol, &config, &targets), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.summary().success, 25);
    for job in &report.jobs {
        assert!(
            window.contains(job.start_delay),
            "{:?} outside {window}",
            job.start_delay
        );
    }
    let distinct: std::collections::BTreeSet<_> =
        report.jobs.iter().map(|job| job.start_delay).collect();
    assert!(distinct.len() > 1, "jobs should not share one delay");
}

#[tokio::test(start_paused = true)]
async fn seeded_jitter_is_reproducible() {
    let window = JitterWindow::new(0, 10).unwrap();
    let mut runs = Vec::new();
    for _ in 0..2 {
        let protocol = Scripted::shared();
        let config = Arc::new(config(8).with_jitter(Some(window)));
        let report = ScanOrchestrator::new(Arc::new(MemoryStore::new()))
            .with_jitter_source(JitterSource::seeded(2024))
            .run(jobs(&protocol, &config, &["a", "b", "c", "d"]), config)
            .await
            .expect("run should succeed");
        runs.push(
            report
                .jobs
                .iter()
                .map(|job| job.start_delay)
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(runs[0], runs[1]);
}

#[tokio::test]
async fn slow_job_times_out_without_holding_the_run() {
    let protocol = Scripted::shared();
    let config = Arc::new(
        config(4)
            .with_timeout(Some(Duration::from_millis(300)))
            .with_drain_grace(Duration::from_millis(100)),
    );

    let started = Instant::now();
    let report = ScanOrchestrator::new(store_shut_down_once())
        .run(jobs(&protocol, &config, &["a", "sleep:4000", "b"]), config)
        .await
        .expect("run should succeed");

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(report.outcome_for("a"), Some(&JobOutcome::Success));
    assert_eq!(report.outcome_for("sleep:4000"), Some(&JobOutcome::Timeout));
    assert_eq!(report.outcome_for("b"), Some(&JobOutcome::Success));
}

#[tokio::test]
async fn timed_out_job_token_is_cancelled_for_cooperative_plugins() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(2).with_timeout(Some(Duration::from_millis(100))));

    let report = ScanOrchestrator::new(store_shut_down_once())
        .run(jobs(&protocol, &config, &["hold", "a"]), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.outcome_for("hold"), Some(&JobOutcome::Timeout));
    // The drain waits for the worker, which returns once it sees its token.
    assert_eq!(protocol.observed_cancel(), 1);
}

#[tokio::test]
async fn abort_cancels_remaining_jobs_and_shuts_store_once() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(4));
    let mut targets = vec!["done-1", "done-2"];
    targets.extend(std::iter::repeat_n("hold", 8));

    let orchestrator = ScanOrchestrator::new(store_shut_down_once());
    let cancel = orchestrator.cancel_token();
    let progress = orchestrator.progress();
    let run = tokio::spawn(orchestrator.run(jobs(&protocol, &config, &targets), config));

    let deadline = Instant::now() + Duration::from_secs(5);
    while progress.snapshot().completed < 2 {
        assert!(Instant::now() < deadline, "first jobs never completed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cancel.cancel();

    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should finish after abort")
        .expect("run task should not panic")
        .expect("run should succeed");

    assert!(report.cancelled);
    let summary = report.summary();
    assert_eq!(summary.success, 2);
    assert_eq!(summary.cancelled, 8);
    assert_eq!(summary.total(), 10);
}

#[tokio::test]
async fn cancelled_before_start_dispatches_nothing() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(2));
    let orchestrator = ScanOrchestrator::new(store_shut_down_once());
    orchestrator.cancel_token().cancel();

    let report = orchestrator
        .run(jobs(&protocol, &config, &["a", "b", "c"]), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.summary().cancelled, 3);
    assert_eq!(protocol.executed(), 0);
}

#[tokio::test]
async fn zero_sized_pool_fails_after_teardown() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(0));

    let err = ScanOrchestrator::new(store_shut_down_once())
        .run(jobs(&protocol, &config, &["a"]), config)
        .await
        .expect_err("pool of zero must fail");

    assert!(matches!(err, OrchestratorError::PoolAllocation(_)));
    assert_eq!(protocol.executed(), 0);
}

#[tokio::test]
async fn store_shutdown_failure_is_logged_not_returned() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(2));
    let mut store = MockStore::new();
    store.expect_record().returning(|_| Ok(()));
    store
        .expect_shutdown()
        .times(1)
        .returning(|| Err(PersistenceError::Backend("disk full".into())));

    let report = ScanOrchestrator::new(Arc::new(store))
        .run(jobs(&protocol, &config, &["a", "fail", "b"]), config)
        .await
        .expect("a failing store shutdown must not fail the run");

    assert_eq!(report.len(), 3);
    assert_eq!(report.outcome_for("a"), Some(&JobOutcome::Success));
    assert_eq!(
        report.outcome_for("fail"),
        Some(&JobOutcome::Error("connection refused".into()))
    );
    assert_eq!(report.outcome_for("b"), Some(&JobOutcome::Success));
}

/// What teardown had already released when the store was shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AtStoreShutdown {
    monitor_stopped: bool,
    callback_listening: bool,
    workers_finished: usize,
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_runs_monitor_store_callback_then_drain() {
    let protocol = Scripted::shared();
    let config = Arc::new(
        config(1)
            .with_timeout(Some(Duration::from_millis(100)))
            .with_drain_grace(Duration::from_secs(5)),
    );

    let module: Arc<dyn ModulePlugin> = Arc::new(Canary::default());
    let state = CallbackState::new(module, Arc::clone(&config), Arc::new(MemoryStore::new()));
    let binding = ServerBinding {
        host: "127.0.0.1".into(),
        port: Some(0),
        kind: ServerKind::Http,
        tls: None,
    };
    let callback = CallbackServer::start(state, &binding, ServerKind::Http)
        .await
        .expect("bind ephemeral port");
    let callback_addr = callback.local_addr();

    let (trigger, trigger_rx) = mpsc::channel(1);
    let seen = Arc::new(Mutex::new(None));
    let mut store = MockStore::new();
    store.expect_record().returning(|_| Ok(()));
    {
        let protocol = Arc::clone(&protocol);
        let trigger = trigger.clone();
        let seen = Arc::clone(&seen);
        store.expect_shutdown().times(1).returning(move || {
            *seen.lock() = Some(AtStoreShutdown {
                monitor_stopped: trigger.is_closed(),
                callback_listening: StdStream::connect(callback_addr).is_ok(),
                workers_finished: protocol.finished(),
            });
            Ok(())
        });
    }

    let report = ScanOrchestrator::new(Arc::new(store))
        .with_callback(Some(callback))
        .with_progress_trigger(trigger_rx)
        .run(jobs(&protocol, &config, &["sleep:800"]), config)
        .await
        .expect("run should succeed");

    assert_eq!(report.outcome_for("sleep:800"), Some(&JobOutcome::Timeout));
    assert_eq!(
        *seen.lock(),
        Some(AtStoreShutdown {
            monitor_stopped: true,
            callback_listening: true,
            workers_finished: 0,
        })
    );
    assert!(trigger.is_closed());
    assert!(StdStream::connect(callback_addr).is_err(), "callback stopped before run returned");
    assert_eq!(protocol.finished(), 1, "drain waited for the timed-out worker");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropped_run_still_tears_down_once() {
    let protocol = Scripted::shared();
    let config = Arc::new(config(2));
    let store = Arc::new(MemoryStore::new());
    let orchestrator = ScanOrchestrator::new(store.clone());
    let caller_cancel = orchestrator.cancel_token();

    let run = orchestrator.run(jobs(&protocol, &config, &["hold", "hold"]), config);
    let elapsed = tokio::time::timeout(Duration::from_millis(200), run).await;
    assert!(elapsed.is_err(), "holding jobs keep the run busy");

    let deadline = Instant::now() + Duration::from_secs(5);
    while store.shutdown_count() == 0 || protocol.observed_cancel() < 2 {
        assert!(Instant::now() < deadline, "dropped run never tore down");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.shutdown_count(), 1);
    assert_eq!(protocol.observed_cancel(), 2);
    assert!(!caller_cancel.is_cancelled(), "only the run's own token is cancelled");
}
