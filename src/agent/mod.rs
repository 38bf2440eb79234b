//! Background worker supervision
//!
//! This module provides a supervisor that owns one long-lived periodic task:
//! - Agent state (run status, counters, heartbeat) behind a single lock
//! - Runtime config store, read by the worker once per cycle
//! - Bounded in-memory log buffer
//! - Pluggable tick function with fail-stop error handling
//!
//! # Architecture
//!
//! ```text
//! caller ── start() ──► Supervisor ── spawn ──► Worker task
//!                           │                       │
//!        status()/logs() ◄──┤                       ├─ lock: heartbeat + iteration
//!                           │                       ├─ Tick::tick(ctx)   (no lock)
//!        set_config() ──────┤                       ├─ LogSink (best effort)
//!                           │                       └─ sleep(intervalSeconds) | cancelled
//!          stop() ── cancel token ──────────────────►
//! ```

pub mod config;
pub mod log_buffer;
pub mod state;
pub mod supervisor;
pub mod tick;
mod worker;

pub use config::{ConfigRejection, ConfigStore, INTERVAL_KEY};
pub use log_buffer::{LogEntry, LogRingBuffer};
pub use state::{RunStatus, StatusSnapshot};
pub use supervisor::{StartOutcome, StopOutcome, Supervisor, SupervisorOptions};
pub use tick::{FnTick, PlaceholderTick, Tick, TickContext, TickError};
