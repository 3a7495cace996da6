pub mod builders;
pub mod fake_backend;
pub mod fake_tree;

use std::sync::{Arc, Once};
use std::time::Duration;

use seqrun::config::EngineConfig;
use seqrun::engine::{Engine, EngineParts, Timings};
use tracing_subscriber::{fmt, EnvFilter};

pub use builders::EngineConfigBuilder;
pub use fake_backend::{FakeBackend, FakeScript};
pub use fake_tree::{RecordingTree, TreeCall};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// Engine timings shrunk so tests finish in milliseconds.
pub fn fast_timings() -> Timings {
    Timings {
        dequeue_wait: Duration::from_millis(20),
        paused_backoff: Duration::from_millis(10),
        idle_sleep: Duration::from_millis(2),
        idle_polls_before_exit_check: 5,
        monitor_interval: Duration::from_millis(10),
        tail_interval: Duration::from_millis(20),
        terminate_grace: Duration::from_millis(300),
        drain_limit: Duration::from_millis(500),
    }
}

/// Engine wired to a fake backend and a recording tree control, with fast
/// timings. Must be called inside a Tokio runtime.
pub fn fake_engine(config: &EngineConfig, backend: &FakeBackend, tree: &RecordingTree) -> Engine {
    Engine::with_parts(
        config,
        EngineParts {
            backend: Some(Arc::new(backend.clone())),
            tree: Some(Arc::new(tree.clone())),
            timings: fast_timings(),
            ..EngineParts::default()
        },
    )
    .expect("engine with fake parts should build")
}
