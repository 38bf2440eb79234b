//! Agent state - run status, counters and timestamps shared between the
//! supervisor and its worker task.
//!
//! All fields live behind a single mutex owned by the supervisor. Readers get a
//! [`StatusSnapshot`] copied out under the lock, so a snapshot never mixes an
//! old heartbeat with a new iteration count.
//!
//! ```text
//!   Idle ──► Running ──► Stopping ──► Stopped
//!               │            │
//!               └──► Errored ◄┘
//!
//!   Stopped / Errored ──► Running   (fresh start)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

/// Lifecycle state of the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Never started
    Idle,
    /// Worker loop is active
    Running,
    /// Cessation requested, worker has not yet observed it
    Stopping,
    /// Worker exited after a stop request
    Stopped,
    /// Worker exited because a tick failed
    Errored,
}

impl RunStatus {
    /// Whether `self -> next` is an edge of the worker state machine
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Stopped, Running)
                | (Errored, Running)
                | (Running, Stopping)
                | (Running, Errored)
                | (Stopping, Stopped)
                | (Stopping, Errored)
        )
    }

    /// True while a worker task owns this state (Running or Stopping)
    pub fn has_live_worker(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Stopping => "stopping",
            RunStatus::Stopped => "stopped",
            RunStatus::Errored => "errored",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable worker status. Only ever touched with the supervisor's state lock held.
#[derive(Debug)]
pub struct AgentState {
    pub(crate) status: RunStatus,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) last_heartbeat: Option<DateTime<Utc>>,
    pub(crate) iterations: u64,
    pub(crate) message: String,
    /// Identifier of the current (or most recent) worker run
    pub(crate) run_id: Option<String>,
    /// Cancellation signal for the current run
    pub(crate) cancel: Option<CancellationToken>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            status: RunStatus::Idle,
            started_at: None,
            last_heartbeat: None,
            iterations: 0,
            message: "idle".to_string(),
            run_id: None,
            cancel: None,
        }
    }
}

impl AgentState {
    /// Move to `next`, returning false (and leaving the state untouched) if the
    /// edge is not part of the state machine.
    pub(crate) fn transition(&mut self, next: RunStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Reset counters for a fresh run and enter Running
    pub(crate) fn begin_run(&mut self, run_id: String, cancel: CancellationToken) -> bool {
        if !self.transition(RunStatus::Running) {
            return false;
        }
        self.started_at = Some(Utc::now());
        self.last_heartbeat = None;
        self.iterations = 0;
        self.message = "running".to_string();
        self.run_id = Some(run_id);
        self.cancel = Some(cancel);
        true
    }

    /// Record one tick: counter and heartbeat move together
    pub(crate) fn record_iteration(&mut self) -> u64 {
        self.iterations += 1;
        self.last_heartbeat = Some(Utc::now());
        self.iterations
    }

    pub(crate) fn snapshot(&self, interval_seconds: u64) -> StatusSnapshot {
        StatusSnapshot {
            state: self.status,
            started_at: self.started_at,
            last_heartbeat: self.last_heartbeat,
            iterations: self.iterations,
            message: self.message.clone(),
            interval_seconds,
            run_id: self.run_id.clone(),
        }
    }
}

/// Point-in-time copy of the worker status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: RunStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub iterations: u64,
    pub message: String,
    /// Effective cadence the worker will use for its next sleep
    pub interval_seconds: u64,
    pub run_id: Option<String>,
}
