// src/engine/monitor.rs

//! One monitor task per batch.
//!
//! Recomputes the batch status from its members every interval, and on
//! completion records the final status and fires the batch callback once.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::engine::core::{evaluate_batch, in_flight_batch_status, BatchProgress};
use crate::engine::state::{invoke_callback, EngineState};
use crate::registry::{BatchCallback, BatchSnapshot};

enum Step {
    Continue,
    Done(Option<BatchCallback>, BatchSnapshot),
    Gone,
}

pub async fn run_batch_monitor(state: Arc<EngineState>, batch_id: String) {
    let interval = state.timings().monitor_interval;
    debug!(batch = %batch_id, "batch monitor started");

    loop {
        match step(&state, &batch_id) {
            Step::Continue => {}
            Step::Done(callback, snapshot) => {
                info!(
                    batch = %batch_id,
                    status = %snapshot.status,
                    members = snapshot.execution_ids.len(),
                    "batch finished"
                );
                if let Some(callback) = callback {
                    invoke_callback("batch", &batch_id, callback.as_ref(), &snapshot);
                }
                break;
            }
            Step::Gone => {
                warn!(batch = %batch_id, "batch missing from registry; monitor exiting");
                break;
            }
        }
        sleep(interval).await;
    }
}

fn step(state: &EngineState, batch_id: &str) -> Step {
    state.registry.with_records(|r| {
        let Some(members) = r.member_statuses(batch_id) else {
            return Step::Gone;
        };
        let Some(batch) = r.batch_mut(batch_id) else {
            return Step::Gone;
        };

        match evaluate_batch(&members) {
            BatchProgress::InFlight { any_paused } => {
                let next = in_flight_batch_status(any_paused);
                if batch.status != next {
                    debug!(batch = %batch_id, from = %batch.status, to = %next, "batch status changed");
                    batch.status = next;
                }
                Step::Continue
            }
            BatchProgress::Complete(status) => {
                batch.status = status;
                batch.end_time = Some(Utc::now());
                Step::Done(batch.on_complete.take(), batch.snapshot())
            }
        }
    })
}
