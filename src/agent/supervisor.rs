//! Supervisor - the public control surface for the background worker.
//!
//! Owns the agent state, config store and log buffer, and spawns at most one
//! worker task at a time. `start()` and `stop()` both decide under the state
//! lock, so a start racing a stop can never produce a second live worker: a
//! start issued while the previous worker is still `Stopping` is rejected.
//!
//! All methods are synchronous and cheap. `start()` spawns onto the ambient
//! Tokio runtime and must be called from within one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::config::{ConfigStore, DEFAULT_INTERVAL_SECS};
use super::log_buffer::{LogEntry, LogRingBuffer, DEFAULT_LOG_CAPACITY};
use super::state::{AgentState, RunStatus, StatusSnapshot};
use super::tick::Tick;
use super::worker;
use crate::metrics::WORKER_STARTS;
use crate::storage::{LogSink, NullSink};

/// Construction-time settings for a supervisor
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Initial `intervalSeconds` value
    pub default_interval_secs: u64,
    /// Maximum entries kept in the log buffer
    pub log_capacity: usize,
    /// Upper bound on a single tick; `None` lets a tick run indefinitely
    pub tick_timeout: Option<Duration>,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            default_interval_secs: DEFAULT_INTERVAL_SECS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            tick_timeout: None,
        }
    }
}

impl SupervisorOptions {
    /// Defaults overridden by `QP_INTERVAL_SECONDS`, `QP_LOG_CAPACITY` and
    /// `QP_TICK_TIMEOUT_SECS`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(secs) = parse_var(&lookup, "QP_INTERVAL_SECONDS") {
            options.default_interval_secs = secs;
        }
        if let Some(capacity) = parse_var(&lookup, "QP_LOG_CAPACITY") {
            options.log_capacity = capacity;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "QP_TICK_TIMEOUT_SECS") {
            options.tick_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        options
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

/// Result of [`Supervisor::start`]
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub started: bool,
    pub status: StatusSnapshot,
}

/// Result of [`Supervisor::stop`]
#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub stopped: bool,
    pub status: StatusSnapshot,
}

/// State shared between the supervisor and its worker task
pub(crate) struct Shared {
    pub(crate) state: Mutex<AgentState>,
    pub(crate) config: ConfigStore,
    pub(crate) logs: LogRingBuffer,
    pub(crate) sink: Arc<dyn LogSink>,
    pub(crate) tick: Arc<dyn Tick>,
    pub(crate) tick_timeout: Option<Duration>,
}

impl Shared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, AgentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the log buffer and mirror to tracing
    pub(crate) fn log(&self, text: &str) {
        info!(target: "quantumpulse::supervisor", "{}", text);
        self.logs.push(text);
    }

    /// [`log`](Self::log) plus a best-effort copy to the sink
    pub(crate) fn record(&self, text: &str) {
        self.log(text);
        self.sink_best_effort(text);
    }

    /// Sink errors are dropped here and never reach the worker loop
    pub(crate) fn sink_best_effort(&self, text: &str) {
        if let Err(e) = self.sink.append_log(text) {
            debug!(error = %e, "log sink write failed");
        }
    }
}

/// Owner of one periodic background task
pub struct Supervisor {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
    /// Create a supervisor with default options and no sink
    pub fn new(tick: Arc<dyn Tick>) -> Self {
        Self::with_options(tick, Arc::new(NullSink), SupervisorOptions::default())
    }

    pub fn with_options(
        tick: Arc<dyn Tick>,
        sink: Arc<dyn LogSink>,
        options: SupervisorOptions,
    ) -> Self {
        let shared = Shared {
            state: Mutex::new(AgentState::default()),
            config: ConfigStore::new(options.default_interval_secs),
            logs: LogRingBuffer::new(options.log_capacity),
            sink,
            tick,
            tick_timeout: options.tick_timeout,
        };
        Self {
            shared: Arc::new(shared),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker. Idempotent while running.
    ///
    /// Returns `started: false` only when the previous worker has been asked
    /// to stop but has not exited yet.
    pub fn start(&self) -> StartOutcome {
        let interval = self.shared.config.interval_secs();
        let mut state = self.shared.lock_state();

        match state.status {
            RunStatus::Running => {
                self.shared.log("start requested while already running");
                return StartOutcome {
                    started: true,
                    status: state.snapshot(interval),
                };
            }
            RunStatus::Stopping => {
                self.shared
                    .log("start rejected: previous worker is still stopping");
                return StartOutcome {
                    started: false,
                    status: state.snapshot(interval),
                };
            }
            RunStatus::Idle | RunStatus::Stopped | RunStatus::Errored => {}
        }

        let run_id = Uuid::now_v7().to_string();
        let cancel = CancellationToken::new();
        if !state.begin_run(run_id.clone(), cancel.clone()) {
            return StartOutcome {
                started: false,
                status: state.snapshot(interval),
            };
        }

        self.shared
            .log(&format!("worker started (run {}, interval {}s)", run_id, interval));
        let handle = worker::spawn(Arc::clone(&self.shared), run_id, cancel);
        *self.lock_worker() = Some(handle);
        let status = state.snapshot(interval);
        drop(state);

        WORKER_STARTS.inc();
        StartOutcome {
            started: true,
            status,
        }
    }

    /// Ask the worker to stop. Idempotent; does not wait for the worker to exit.
    pub fn stop(&self) -> StopOutcome {
        let interval = self.shared.config.interval_secs();
        let mut state = self.shared.lock_state();

        if state.status != RunStatus::Running {
            debug!(state = %state.status, "stop requested while not running");
            return StopOutcome {
                stopped: true,
                status: state.snapshot(interval),
            };
        }

        state.transition(RunStatus::Stopping);
        state.message = "stopping".to_string();
        if let Some(cancel) = &state.cancel {
            cancel.cancel();
        }
        self.shared.log("stop requested");
        let status = state.snapshot(interval);
        drop(state);

        self.shared.sink_best_effort("stop requested");
        StopOutcome {
            stopped: true,
            status,
        }
    }

    /// Stop the worker and wait for its task to finish
    pub async fn shutdown(&self) {
        self.stop();
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }

    pub fn status(&self) -> StatusSnapshot {
        let interval = self.shared.config.interval_secs();
        self.shared.lock_state().snapshot(interval)
    }

    /// True while a worker task is running or winding down
    pub fn is_worker_alive(&self) -> bool {
        self.shared.lock_state().status.has_live_worker()
    }

    pub fn get_config(&self) -> Map<String, Value> {
        self.shared.config.snapshot()
    }

    /// Merge non-null fields into the config and return the result.
    ///
    /// Rejected values are logged and skipped, never reported as errors.
    /// Changes take effect from the worker's next cycle.
    pub fn set_config(&self, update: &Map<String, Value>) -> Map<String, Value> {
        let report = self.shared.config.merge(update);

        for rejection in &report.rejected {
            warn!(key = %rejection.key, value = %rejection.value, reason = rejection.reason, "config value rejected");
            self.shared.logs.push(format!("config {}", rejection));
        }
        if !report.applied.is_empty() {
            self.shared
                .log(&format!("config updated: {}", Value::Object(report.applied)));
        }

        self.shared.config.snapshot()
    }

    /// Newest `limit` log lines, oldest first
    pub fn get_logs(&self, limit: usize) -> Vec<String> {
        self.shared.logs.tail_lines(limit)
    }

    /// Structured form of [`get_logs`](Self::get_logs)
    pub fn log_entries(&self, limit: usize) -> Vec<LogEntry> {
        self.shared.logs.tail(limit)
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // the worker holds its own Arc<Shared> and outlives us unless stopped
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tick::{FnTick, PlaceholderTick, TickContext, TickError};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn placeholder() -> Supervisor {
        Supervisor::new(Arc::new(PlaceholderTick::new(Duration::from_millis(5))))
    }

    #[test]
    fn test_options_defaults() {
        let options = SupervisorOptions::default();
        assert_eq!(options.default_interval_secs, 5);
        assert_eq!(options.log_capacity, 2000);
        assert!(options.tick_timeout.is_none());
    }

    #[test]
    fn test_options_from_lookup() {
        let options = SupervisorOptions::from_lookup(|key| match key {
            "QP_INTERVAL_SECONDS" => Some("2".to_string()),
            "QP_LOG_CAPACITY" => Some("not-a-number".to_string()),
            "QP_TICK_TIMEOUT_SECS" => Some("30".to_string()),
            _ => None,
        });
        assert_eq!(options.default_interval_secs, 2);
        assert_eq!(options.log_capacity, 2000);
        assert_eq!(options.tick_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_initial_status() {
        let sup = placeholder();
        let status = sup.status();
        assert_eq!(status.state, RunStatus::Idle);
        assert_eq!(status.iterations, 0);
        assert_eq!(status.interval_seconds, 5);
        assert!(status.started_at.is_none());
        assert!(!sup.is_worker_alive());
    }

    #[test]
    fn test_stop_when_idle_is_a_noop() {
        let sup = placeholder();
        let before = sup.status();
        let outcome = sup.stop();

        assert!(outcome.stopped);
        assert_eq!(outcome.status, before);
        assert!(sup.get_logs(10).is_empty());
    }

    #[test]
    fn test_set_config_logs_delta_and_rejections() {
        let sup = placeholder();
        let result = sup.set_config(&obj(json!({
            "intervalSeconds": "bogus",
            "symbol": "SPY",
            "ignored": null
        })));

        assert_eq!(result.get("intervalSeconds"), Some(&json!(5)));
        assert_eq!(result.get("symbol"), Some(&json!("SPY")));
        assert!(!result.contains_key("ignored"));

        let logs = sup.get_logs(10);
        assert_eq!(logs.len(), 2);
        assert!(logs[0].contains("config rejected intervalSeconds"));
        assert!(logs[1].contains("config updated"));
        assert!(logs[1].contains("SPY"));
    }

    #[test]
    fn test_set_config_zero_interval() {
        let sup = placeholder();
        sup.set_config(&obj(json!({ "intervalSeconds": 0 })));
        assert_eq!(sup.status().interval_seconds, 1);
        assert_eq!(sup.get_config().get("intervalSeconds"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_start_then_restart_while_stopping_is_rejected() {
        let sup = placeholder();
        assert!(sup.start().started);
        assert!(sup.is_worker_alive());

        let stopped = sup.stop();
        assert_eq!(stopped.status.state, RunStatus::Stopping);

        // current-thread runtime: the worker cannot run until we yield
        let again = sup.start();
        assert!(!again.started);
        assert_eq!(again.status.state, RunStatus::Stopping);

        sup.shutdown().await;
        assert_eq!(sup.status().state, RunStatus::Stopped);
        assert!(sup.start().started);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_tick_timeout_is_a_failure() {
        let tick = FnTick::new(|_ctx: TickContext| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<(), TickError>(())
        });
        let options = SupervisorOptions {
            tick_timeout: Some(Duration::from_millis(50)),
            ..SupervisorOptions::default()
        };
        let sup = Supervisor::with_options(Arc::new(tick), Arc::new(NullSink), options);

        sup.start();
        tokio::time::sleep(Duration::from_millis(300)).await;

        let status = sup.status();
        assert_eq!(status.state, RunStatus::Errored);
        assert!(status.message.starts_with("error: tick timed out"));
        assert!(!sup.is_worker_alive());
    }

    #[tokio::test]
    async fn test_panicking_tick_is_contained() {
        let tick = FnTick::new(|ctx: TickContext| async move {
            if ctx.iteration > 0 {
                panic!("tick exploded");
            }
            Ok::<(), TickError>(())
        });
        let sup = Supervisor::new(Arc::new(tick));

        sup.start();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let status = sup.status();
        assert_eq!(status.state, RunStatus::Errored);
        assert_eq!(status.message, "error: tick panicked: tick exploded");
        assert_eq!(status.iterations, 1);
    }

    #[tokio::test]
    async fn test_tick_failing_after_stop_request_ends_errored() {
        let tick = FnTick::new(|ctx: TickContext| async move {
            ctx.cancel.cancelled().await;
            Err::<(), _>(TickError::failed("interrupted by stop"))
        });
        let sup = Supervisor::new(Arc::new(tick));

        sup.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sup.stop().status.state, RunStatus::Stopping);

        sup.shutdown().await;
        let status = sup.status();
        assert_eq!(status.state, RunStatus::Errored);
        assert_eq!(status.message, "error: interrupted by stop");
        assert!(!sup.is_worker_alive());
    }

    #[tokio::test]
    async fn test_drop_stops_orphaned_worker() {
        use std::sync::atomic::{AtomicU64, Ordering};

        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let tick = FnTick::new(move |_ctx: TickContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<(), TickError>(()) }
        });
        let sup = Supervisor::new(Arc::new(tick));
        sup.set_config(&obj(json!({ "intervalSeconds": 1 })));

        sup.start();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        drop(sup);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
