//! Prometheus metrics for the background worker
//!
//! Registered in the default registry on first use. Counters are process-wide,
//! so several supervisors in one process add into the same series.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};

lazy_static! {
    /// Worker runs started (fresh `start()` calls that spawned a task)
    pub static ref WORKER_STARTS: Counter = register_counter!(
        "quantumpulse_worker_starts_total",
        "Worker runs started"
    ).expect("failed to register WORKER_STARTS metric");

    /// Completed ticks by outcome.
    ///
    /// Labels:
    /// - outcome: "ok", "failed", "timeout" or "panic"
    pub static ref TICKS_TOTAL: CounterVec = register_counter_vec!(
        "quantumpulse_ticks_total",
        "Ticks executed by outcome",
        &["outcome"]
    ).expect("failed to register TICKS_TOTAL metric");

    /// Wall time spent inside the tick function
    pub static ref TICK_DURATION: Histogram = register_histogram!(
        "quantumpulse_tick_duration_seconds",
        "Duration of a single tick",
        vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
    ).expect("failed to register TICK_DURATION metric");

    /// Number of live worker tasks (0 or 1 per supervisor)
    pub static ref WORKER_RUNNING: Gauge = register_gauge!(
        "quantumpulse_worker_running",
        "Live worker tasks"
    ).expect("failed to register WORKER_RUNNING metric");
}

/// Render every registered metric in the Prometheus text format
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buf) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8_lossy(&buf).into_owned()
}
