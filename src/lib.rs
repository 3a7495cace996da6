// src/lib.rs

pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod registry;
pub mod types;
pub mod watch;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_or_default, EngineConfig};
use crate::engine::Engine;
use crate::exec::command::{interpreter_for, param_args};
use crate::exec::LaunchSpec;
use crate::registry::{BatchSnapshot, ExecutionSnapshot, Params};
use crate::types::Status;

pub use crate::engine::{EngineParts, Timings};
pub use crate::errors::{EngineError, Result as EngineResult};
pub use crate::types::TestResult;

/// Slack on top of the per-script timeout when waiting for a whole run.
const WAIT_SLACK_PER_SCRIPT: Duration = Duration::from_secs(10);

/// What `--json` prints.
#[derive(Debug, Serialize)]
struct RunReport {
    batch: Option<BatchSnapshot>,
    executions: Vec<ExecutionSnapshot>,
}

/// High-level entry point used by `main.rs`.
///
/// Loads config, queues the scripts, waits for them and prints a report.
/// Returns `Ok(true)` when every execution ended in `SUCCESS`.
pub async fn run(args: CliArgs) -> Result<bool> {
    let mut cfg = load_or_default(args.config.as_deref())?;
    if let Some(secs) = args.timeout {
        cfg.engine.default_timeout_secs = secs;
    }
    if args.watch_output {
        cfg.engine.watch_output_files = true;
    }
    let params: Params = args.params.iter().cloned().collect();

    if args.dry_run {
        print_dry_run(&cfg, &args, &params);
        return Ok(true);
    }

    let engine = Arc::new(Engine::new(&cfg)?);

    // Ctrl-C → cancel everything and stop.
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("interrupt received; shutting down");
            engine.shutdown();
        });
    }

    let batch_id = if args.batch {
        Some(engine.enqueue_batch(args.scripts.iter().cloned(), params, None))
    } else {
        for script in &args.scripts {
            engine.enqueue_script(script.clone(), params.clone(), None, None);
        }
        None
    };
    info!(scripts = args.scripts.len(), batch = args.batch, "scripts queued");

    let per_script = engine.effective_timeout() + WAIT_SLACK_PER_SCRIPT;
    let limit = per_script * u32::try_from(args.scripts.len()).unwrap_or(u32::MAX);
    if !engine.wait_idle(limit).await {
        warn!("gave up waiting for scripts to finish");
    }

    let batch = match &batch_id {
        Some(id) => engine.wait_for(id, cfg.default_timeout()).await.as_batch().cloned(),
        None => None,
    };
    let executions = engine.list();
    engine.shutdown();

    if args.json {
        let report = RunReport { batch, executions };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report.executions.iter().all(|e| e.status == Status::Success));
    }

    print_summary(batch.as_ref(), &executions);
    Ok(executions.iter().all(|e| e.status == Status::Success))
}

fn print_summary(batch: Option<&BatchSnapshot>, executions: &[ExecutionSnapshot]) {
    if let Some(batch) = batch {
        println!("batch {}: {}", batch.id, batch.status);
    }
    for exec in executions {
        let verdict = exec
            .test_result
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        let elapsed = match (exec.start_time, exec.end_time) {
            (Some(start), Some(end)) => format!("{:.1}s", (end - start).num_milliseconds() as f64 / 1000.0),
            _ => "-".to_string(),
        };
        println!(
            "{:<10} {:<8} {:>8}  {}",
            exec.status,
            verdict,
            elapsed,
            exec.script_path.display()
        );
        if let Some(error) = &exec.error {
            println!("           {error}");
        }
    }
}

/// Print what would run: config summary and the command line per script.
fn print_dry_run(cfg: &EngineConfig, args: &CliArgs, params: &Params) {
    println!("seqrun dry-run");
    println!("  engine.default_timeout_secs = {}", cfg.engine.default_timeout_secs);
    println!("  engine.python = {}", cfg.engine.python);
    if let Some(dir) = &cfg.engine.working_dir {
        println!("  engine.working_dir = {}", dir.display());
    }
    println!("  engine.watch_output_files = {}", cfg.engine.watch_output_files);
    if cfg.engine.watch_output_files {
        println!("  tail.patterns = {:?}", cfg.tail.patterns);
        println!("  tail.recent_secs = {}", cfg.tail.recent_secs);
    }
    println!();

    let launch = LaunchSpec {
        python: cfg.engine.python.clone(),
        working_dir: cfg.engine.working_dir.clone(),
    };
    let extra = param_args(params);
    let mode = if args.batch { "batch" } else { "queue" };
    println!("{mode} ({}):", args.scripts.len());
    for script in &args.scripts {
        let (program, mut argv) = interpreter_for(script, &launch);
        argv.extend(extra.iter().cloned());
        println!("  - {program} {}", argv.join(" "));
    }

    debug!("dry-run complete (no execution)");
}
