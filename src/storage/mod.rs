//! Best-effort persistence sinks for worker output
//!
//! The worker hands every tick summary and lifecycle event to a [`LogSink`].
//! Sink failures are the sink's problem: the worker logs them at debug level
//! and carries on.
//!
//! - [`NullSink`] - discards everything
//! - [`JsonlSink`] - one JSON object per line, append-only
//! - [`MemoryDocument`] - single JSON document with a `memory` array

pub mod document;
pub mod jsonl;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use document::MemoryDocument;
pub use jsonl::JsonlSink;

/// Error writing to or reading from a sink
#[derive(Debug)]
pub enum SinkError {
    /// Filesystem failure
    Io(std::io::Error),
    /// Record could not be encoded or decoded
    Serialize(serde_json::Error),
}

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkError::Io(e) => write!(f, "sink I/O error: {}", e),
            SinkError::Serialize(e) => write!(f, "sink serialization error: {}", e),
        }
    }
}

impl std::error::Error for SinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SinkError::Io(e) => Some(e),
            SinkError::Serialize(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e)
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(e: serde_json::Error) -> Self {
        SinkError::Serialize(e)
    }
}

/// External log/storage collaborator
pub trait LogSink: Send + Sync {
    fn append_log(&self, text: &str) -> Result<(), SinkError>;
}

/// Sink that accepts and drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl LogSink for NullSink {
    fn append_log(&self, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Timestamped record written by the file-backed sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub time: DateTime<Utc>,
    pub text: String,
}

impl SinkRecord {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            text: text.into(),
        }
    }
}
