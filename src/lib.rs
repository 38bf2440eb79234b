//! QuantumPulse agent - supervised background worker
//!
//! This library runs one periodic unit of work in the background and exposes
//! thread-safe start/stop/status/config/log controls for it. A failing tick
//! stops the worker cleanly; it never takes the host process down.
//!
//! # Modules
//!
//! - `agent` - supervisor, worker loop, state, config and log buffer
//! - `storage` - best-effort log sinks (JSONL file, JSON document)
//! - `metrics` - Prometheus metrics for the worker
//! - `tracing` - tracing subscriber and OpenTelemetry export setup
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use quantumpulse::{PlaceholderTick, Supervisor};
//!
//! let supervisor = Supervisor::new(Arc::new(PlaceholderTick::default()));
//! supervisor.start();
//! println!("{:?}", supervisor.status());
//! supervisor.shutdown().await;
//! ```

pub mod agent;
pub mod metrics;
pub mod storage;
pub mod tracing;

// Re-export commonly used types at crate root for convenience
pub use agent::{
    PlaceholderTick, RunStatus, StatusSnapshot, Supervisor, SupervisorOptions, Tick, TickContext,
    TickError,
};
pub use storage::{JsonlSink, LogSink, NullSink};
