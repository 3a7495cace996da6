// tests/dispatcher_fake_backend.rs

mod common;
use crate::common::{
    collecting_callback, eventually, fake_engine, fast_timings, init_tracing, settle,
    with_timeout, EngineConfigBuilder, FakeBackend, FakeScript, RecordingTree, TreeCall, SETTLE,
};

use std::error::Error;
use std::sync::Arc;

use tokio::time::{sleep, Duration};

use seqrun::config::ConfigProvider;
use seqrun::engine::{Engine, EngineParts};
use seqrun::registry::{ExecutionCallback, Params};
use seqrun::types::{Status, TestResult as Verdict};

type TestResult = Result<(), Box<dyn Error>>;

fn engine_with(backend: &FakeBackend) -> (Engine, RecordingTree) {
    let tree = RecordingTree::new();
    let engine = fake_engine(&EngineConfigBuilder::new().build(), backend, &tree);
    (engine, tree)
}

fn status(engine: &Engine, id: &str) -> Status {
    engine.get_status(id).status()
}

fn blocker(hold_ms: u64) -> FakeScript {
    FakeScript::default().hold(Duration::from_millis(hold_ms))
}

#[tokio::test]
async fn executions_run_in_fifo_order_one_at_a_time() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new()
        .with_script("a.py", blocker(20))
        .with_script("b.py", blocker(20))
        .with_script("c.py", blocker(20));
    let (engine, _tree) = engine_with(&backend);

    let ids: Vec<String> = ["a.py", "b.py", "c.py"]
        .into_iter()
        .map(|s| engine.enqueue_script(s, Params::new(), None, None))
        .collect();

    with_timeout(settle(&engine)).await;

    assert_eq!(backend.started(), vec!["a.py", "b.py", "c.py"]);
    assert_eq!(backend.peak_concurrency(), 1);

    let snaps: Vec<_> = ids
        .iter()
        .map(|id| engine.get_status(id).as_execution().cloned().unwrap())
        .collect();
    for snap in &snaps {
        assert_eq!(snap.status, Status::Success);
        assert_eq!(snap.test_result, Some(Verdict::Pass));
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.output, vec!["PASS".to_string()]);
    }
    // No two executions overlap in time.
    for pair in snaps.windows(2) {
        assert!(pair[0].end_time.unwrap() <= pair[1].start_time.unwrap());
    }

    let listed: Vec<String> = engine.list().into_iter().map(|e| e.id).collect();
    assert_eq!(listed, ids);

    Ok(())
}

#[tokio::test]
async fn pending_execution_pauses_and_resumes_logically() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("slow.py", blocker(150));
    let (engine, tree) = engine_with(&backend);

    let slow = engine.enqueue_script("slow.py", Params::new(), None, None);
    let later = engine.enqueue_script("later.py", Params::new(), None, None);

    assert!(engine.pause(&later));
    assert_eq!(status(&engine, &later), Status::Paused);

    assert!(eventually(SETTLE, || status(&engine, &slow) == Status::Success).await);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(status(&engine, &later), Status::Paused);
    assert_eq!(backend.started(), vec!["slow.py"]);

    assert!(engine.resume(&later));
    assert_eq!(status(&engine, &later), Status::Pending);

    with_timeout(settle(&engine)).await;
    assert_eq!(status(&engine, &later), Status::Success);
    assert_eq!(backend.started(), vec!["slow.py", "later.py"]);
    // No OS action for a pending execution.
    assert!(tree.calls().is_empty());

    Ok(())
}

#[tokio::test]
async fn paused_item_does_not_block_items_behind_it() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("first.py", blocker(80));
    let (engine, _tree) = engine_with(&backend);

    engine.enqueue_script("first.py", Params::new(), None, None);
    let held = engine.enqueue_script("held.py", Params::new(), None, None);
    engine.enqueue_script("next.py", Params::new(), None, None);
    assert!(engine.pause(&held));

    assert!(
        eventually(SETTLE, || backend.started() == vec!["first.py", "next.py"]).await,
        "next.py should run while held.py is paused, got {:?}",
        backend.started()
    );

    assert!(engine.resume(&held));
    with_timeout(settle(&engine)).await;
    assert_eq!(backend.started(), vec!["first.py", "next.py", "held.py"]);

    Ok(())
}

#[tokio::test]
async fn cancelling_pending_execution_fires_callback_once() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("first.py", blocker(100));
    let (engine, _tree) = engine_with(&backend);
    let (cb, seen) = collecting_callback();

    engine.enqueue_script("first.py", Params::new(), None, None);
    let victim = engine.enqueue_script("victim.py", Params::new(), Some(cb), None);

    assert!(engine.cancel(&victim));
    assert!(!engine.cancel(&victim), "second cancel must be a no-op");
    assert_eq!(status(&engine, &victim), Status::Cancelled);

    assert!(eventually(SETTLE, || seen.lock().unwrap().len() == 1).await);
    sleep(Duration::from_millis(50)).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].status, Status::Cancelled);
    assert_eq!(seen[0].test_result, Some(Verdict::Pending));
    assert_eq!(backend.started(), vec!["first.py"]);

    Ok(())
}

#[tokio::test]
async fn skip_current_on_execution_id_cancels_only_that_execution() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("stuck.py", blocker(5_000));
    let (engine, _tree) = engine_with(&backend);

    let stuck = engine.enqueue_script("stuck.py", Params::new(), None, None);
    let waiting = engine.enqueue_script("waiting.py", Params::new(), None, None);
    assert!(!engine.skip_current(&waiting), "pending execution has nothing to skip");

    assert!(eventually(SETTLE, || status(&engine, &stuck) == Status::Running).await);
    assert!(engine.skip_current(&stuck));

    let snap = with_timeout(engine.wait_for(&waiting, SETTLE)).await;
    assert_eq!(snap.status(), Status::Success);
    assert_eq!(status(&engine, &stuck), Status::Cancelled);
    assert_eq!(backend.started(), vec!["stuck.py", "waiting.py"]);

    assert!(!engine.skip_current(&stuck));

    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_harmless() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let (engine, _tree) = engine_with(&backend);

    assert_eq!(status(&engine, "exec_nope"), Status::Unknown);
    assert!(engine.get_output("exec_nope").is_empty());
    assert!(!engine.cancel("exec_nope"));
    assert!(!engine.pause("exec_nope"));
    assert!(!engine.resume("exec_nope"));
    assert!(!engine.skip_current("batch_nope"));
    assert!(!engine.pause_now("exec_nope").await);

    Ok(())
}

#[tokio::test]
async fn running_execution_is_suspended_and_resumed_through_tree_control() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script(
        "long.py",
        FakeScript::printing(["step 1", "step 2", "step 3", "PASS"])
            .line_delay(Duration::from_millis(40)),
    );
    let (engine, tree) = engine_with(&backend);

    let id = engine.enqueue_script("long.py", Params::new(), None, None);
    assert!(eventually(SETTLE, || !engine.get_output(&id).is_empty()).await);

    assert!(engine.pause_now(&id).await);
    assert_eq!(status(&engine, &id), Status::Paused);

    let frozen = engine.get_output(&id).len();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.get_output(&id).len(), frozen, "no output while paused");

    assert!(engine.resume_now(&id).await);
    assert_eq!(status(&engine, &id), Status::Running);

    with_timeout(settle(&engine)).await;
    assert_eq!(status(&engine, &id), Status::Success);
    assert_eq!(engine.get_output(&id), vec!["step 1", "step 2", "step 3", "PASS"]);

    match tree.calls().as_slice() {
        [TreeCall::Suspend(a), TreeCall::Resume(b)] => assert_eq!(a, b),
        other => panic!("unexpected tree calls: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn failed_suspend_leaves_execution_running() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script(
        "long.py",
        FakeScript::printing(["a", "b", "PASS"]).line_delay(Duration::from_millis(40)),
    );
    let (engine, tree) = engine_with(&backend);
    tree.fail_from_now();

    let id = engine.enqueue_script("long.py", Params::new(), None, None);
    assert!(eventually(SETTLE, || status(&engine, &id) == Status::Running).await);
    assert!(eventually(SETTLE, || !engine.get_output(&id).is_empty()).await);

    assert!(!engine.pause_now(&id).await);
    assert_eq!(status(&engine, &id), Status::Running);

    with_timeout(settle(&engine)).await;
    assert_eq!(status(&engine, &id), Status::Success);

    Ok(())
}

#[tokio::test]
async fn nonzero_exit_fails_and_output_is_classified() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script(
        "bad.py",
        FakeScript::printing(["measuring", "Result: FAIL (3.1V)"]).exit(2),
    );
    let (engine, _tree) = engine_with(&backend);

    let id = engine.enqueue_script("bad.py", Params::new(), None, None);
    let snap = with_timeout(engine.wait_for(&id, SETTLE)).await;
    let snap = snap.as_execution().unwrap();

    assert_eq!(snap.status, Status::Failed);
    assert_eq!(snap.test_result, Some(Verdict::Fail));
    assert!(snap.error.as_deref().unwrap_or_default().contains('2'));
    assert!(snap.progress < 100);

    Ok(())
}

#[tokio::test]
async fn panicking_backend_marks_error_and_worker_survives() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("boom.py", FakeScript::default().panicking());
    let (engine, _tree) = engine_with(&backend);

    let boom = engine.enqueue_script("boom.py", Params::new(), None, None);
    let ok = engine.enqueue_script("ok.py", Params::new(), None, None);

    with_timeout(settle(&engine)).await;

    let boom = engine.get_status(&boom);
    let boom = boom.as_execution().unwrap();
    assert_eq!(boom.status, Status::Error);
    assert_eq!(boom.test_result, Some(Verdict::Error));
    assert_eq!(status(&engine, &ok), Status::Success);

    Ok(())
}

#[tokio::test]
async fn panicking_callback_does_not_stop_the_queue() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let (engine, _tree) = engine_with(&backend);

    let cb: ExecutionCallback = Arc::new(|_| panic!("callback exploded"));
    let first = engine.enqueue_script("first.py", Params::new(), Some(cb), None);
    let second = engine.enqueue_script("second.py", Params::new(), None, None);

    with_timeout(settle(&engine)).await;
    assert_eq!(status(&engine, &first), Status::Success);
    assert_eq!(status(&engine, &second), Status::Success);

    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_an_error_record() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script(
        "missing.py",
        FakeScript::default().outcome(seqrun::exec::RunOutcome::SpawnFailed(
            "no such file".into(),
        )),
    );
    let (engine, _tree) = engine_with(&backend);

    let id = engine.enqueue_script("missing.py", Params::new(), None, None);
    let snap = with_timeout(engine.wait_for(&id, SETTLE)).await;
    let snap = snap.as_execution().unwrap();

    assert_eq!(snap.status, Status::Error);
    assert_eq!(snap.test_result, Some(Verdict::Error));
    assert_eq!(snap.error.as_deref(), Some("no such file"));

    Ok(())
}

#[tokio::test]
async fn watchdog_times_out_long_runs() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script(
        "hang.py",
        FakeScript::printing(["started"]).hold(Duration::from_secs(30)),
    );
    let tree = RecordingTree::new();
    let engine = fake_engine(&EngineConfigBuilder::new().timeout_secs(1).build(), &backend, &tree);

    let id = engine.enqueue_script("hang.py", Params::new(), None, None);
    let snap = with_timeout(engine.wait_for(&id, SETTLE)).await;
    let snap = snap.as_execution().unwrap();

    assert_eq!(snap.status, Status::Timeout);
    assert_eq!(snap.test_result, Some(Verdict::Timeout));
    assert_eq!(snap.output, vec!["started".to_string()]);

    Ok(())
}

#[tokio::test]
async fn timeout_and_parallelism_settings() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new();
    let (engine, _tree) = engine_with(&backend);

    assert_eq!(engine.effective_timeout(), Duration::from_secs(300));
    engine.set_timeout(0);
    assert_eq!(engine.effective_timeout(), Duration::from_secs(300));
    engine.set_timeout(7);
    assert_eq!(engine.effective_timeout(), Duration::from_secs(7));

    engine.set_max_parallel(4);
    assert_eq!(engine.max_parallel(), 1);

    Ok(())
}

struct FixedTimeout(u64);

impl ConfigProvider for FixedTimeout {
    fn default_timeout_secs(&self) -> u64 {
        self.0
    }
}

#[tokio::test]
async fn config_provider_supplies_default_timeout() -> TestResult {
    init_tracing();

    let engine = Engine::with_parts(
        &EngineConfigBuilder::new().build(),
        EngineParts {
            backend: Some(Arc::new(FakeBackend::new())),
            tree: Some(Arc::new(RecordingTree::new())),
            config_provider: Some(Arc::new(FixedTimeout(42))),
            timings: fast_timings(),
            ..EngineParts::default()
        },
    )?;

    assert_eq!(engine.effective_timeout(), Duration::from_secs(42));
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_everything_and_rejects_new_work() -> TestResult {
    init_tracing();

    let backend = FakeBackend::new().with_script("long.py", blocker(2_000));
    let (engine, _tree) = engine_with(&backend);
    let (cb, seen) = collecting_callback();

    let running = engine.enqueue_script("long.py", Params::new(), None, None);
    let queued = engine.enqueue_script("queued.py", Params::new(), Some(cb), None);
    assert!(eventually(SETTLE, || status(&engine, &running) == Status::Running).await);

    engine.shutdown();
    engine.shutdown();
    assert!(!engine.is_running());

    assert_eq!(status(&engine, &running), Status::Cancelled);
    assert_eq!(status(&engine, &queued), Status::Cancelled);
    assert!(eventually(SETTLE, || seen.lock().unwrap().len() == 1).await);

    let (late_cb, late_seen) = collecting_callback();
    let late = engine.enqueue_script("late.py", Params::new(), Some(late_cb), None);
    assert_eq!(status(&engine, &late), Status::Cancelled);
    assert_eq!(late_seen.lock().unwrap().len(), 1);

    assert_eq!(backend.started(), vec!["long.py"]);
    Ok(())
}

#[test]
fn engine_outside_runtime_is_rejected() {
    let result = Engine::new(&EngineConfigBuilder::new().build());
    assert!(matches!(result, Err(seqrun::errors::EngineError::NoRuntime)));
}
