//! Worker loop - runs the tick function on a cadence until stopped or failed.
//!
//! Per cycle:
//! 1. under the state lock: exit if a stop was requested, otherwise bump the
//!    iteration count and heartbeat together
//! 2. run the tick with no lock held
//! 3. on failure: record `Errored` and exit (fail-stop, no retry)
//! 4. sleep for `intervalSeconds`, waking early on cancellation
//!
//! The terminal `Stopped`/`Errored` write is the task's final action, so a
//! fresh `start()` can never overlap a worker that is still winding down.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use super::state::RunStatus;
use super::supervisor::Shared;
use super::tick::{TickContext, TickError};
use crate::metrics::{TICKS_TOTAL, TICK_DURATION, WORKER_RUNNING};

/// Spawn the worker for one run onto the current Tokio runtime
pub(crate) fn spawn(
    shared: Arc<Shared>,
    run_id: String,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("supervisor_worker", run_id = %run_id);
    WORKER_RUNNING.inc();
    tokio::spawn(run(shared, run_id, cancel).instrument(span))
}

/// Why a run ended
enum Exit {
    Stopped,
    Failed { iteration: u64, error: TickError },
}

async fn run(shared: Arc<Shared>, run_id: String, cancel: CancellationToken) {
    info!("worker loop started");
    shared.sink_best_effort(&format!("worker started (run {})", run_id));
    shared.record(&format!("loop started (run {})", run_id));

    let exit = loop {
        let iteration = {
            let mut state = shared.lock_state();
            if cancel.is_cancelled() || state.status != RunStatus::Running {
                break Exit::Stopped;
            }
            state.record_iteration()
        };

        let ctx = TickContext {
            iteration,
            run_id: run_id.clone(),
            config: shared.config.snapshot(),
            cancel: cancel.child_token(),
        };

        let started = Instant::now();
        let result = run_tick(&shared, ctx).await;
        TICK_DURATION.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                TICKS_TOTAL.with_label_values(&["ok"]).inc();
                debug!(iteration, "tick complete");
                shared.logs.push(format!("tick {} complete", iteration));
                shared.sink_best_effort(&format!("tick {} complete (run {})", iteration, run_id));
            }
            Err(error) => {
                TICKS_TOTAL.with_label_values(&[error.kind()]).inc();
                break Exit::Failed { iteration, error };
            }
        }

        let interval = Duration::from_secs(shared.config.interval_secs());
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    };

    finish(&shared, &run_id, exit);
}

/// Wind down a run. The state stays Running/Stopping (so `start()` is refused)
/// until the terminal transition, which is the last thing the task does.
fn finish(shared: &Shared, run_id: &str, exit: Exit) {
    match &exit {
        Exit::Stopped => {
            info!("worker loop exited");
            shared.sink_best_effort(&format!("loop stopped (run {})", run_id));
        }
        Exit::Failed { iteration, error } => {
            error!(iteration, error = %error, "tick failed, worker exiting");
            shared.sink_best_effort(&format!(
                "tick {} failed (run {}): {}",
                iteration, run_id, error
            ));
        }
    }
    WORKER_RUNNING.dec();

    let mut state = shared.lock_state();
    match exit {
        Exit::Stopped => {
            if state.transition(RunStatus::Stopped) {
                state.message = "stopped".to_string();
            }
            shared.log("loop stopping");
        }
        Exit::Failed { iteration, error } => {
            state.transition(RunStatus::Errored);
            state.message = format!("error: {}", error);
            shared.logs.push(format!("tick {} failed: {}", iteration, error));
        }
    }
    state.cancel = None;
}

/// Run one tick, folding panics and timeouts into [`TickError`]
async fn run_tick(shared: &Shared, ctx: TickContext) -> Result<(), TickError> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| shared.tick.tick(ctx))) {
        Ok(fut) => fut,
        Err(payload) => return Err(TickError::Panicked(panic_message(payload))),
    };
    let guarded = AssertUnwindSafe(fut).catch_unwind();

    let outcome = match shared.tick_timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(outcome) => outcome,
            Err(_) => return Err(TickError::TimedOut(limit)),
        },
        None => guarded.await,
    };

    outcome.unwrap_or_else(|payload| Err(TickError::Panicked(panic_message(payload))))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}
