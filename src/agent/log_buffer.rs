//! Bounded, timestamped log kept in memory for callers of the supervisor.
//!
//! Appends and evictions happen under one mutex, so the buffer never exceeds
//! its capacity even with concurrent writers. Reads return copies.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Default number of entries retained
pub const DEFAULT_LOG_CAPACITY: usize = 2000;

/// A single log line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub text: String,
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.time.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.text
        )
    }
}

/// FIFO ring of log entries; the oldest entries are evicted first
pub struct LogRingBuffer {
    entries: Mutex<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogRingBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY))),
            capacity,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }

    /// Append a line stamped with the current time
    pub fn push(&self, text: impl Into<String>) {
        let entry = LogEntry {
            time: Utc::now(),
            text: text.into(),
        };
        let mut entries = self.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The newest `limit` entries, oldest first
    pub fn tail(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    /// Same as [`tail`](Self::tail), rendered as `[timestamp] text`
    pub fn tail_lines(&self, limit: usize) -> Vec<String> {
        self.tail(limit).iter().map(ToString::to_string).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LogRingBuffer {
    fn default() -> Self {
        Self::with_defaults()
    }
}
