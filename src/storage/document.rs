//! Single-document JSON store
//!
//! Keeps agent memory in one pretty-printed file shaped like
//! `{"memory": [ ... ]}`. Every write rewrites the whole document, so this is
//! meant for small histories.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LogSink, SinkError, SinkRecord};

/// On-disk layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryData {
    #[serde(default)]
    pub memory: Vec<Value>,
}

/// File-backed memory document
pub struct MemoryDocument {
    path: PathBuf,
    /// Guards the read-modify-write in `add_memory`
    write_lock: Mutex<()>,
}

impl MemoryDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document; a missing file is an empty document
    pub fn load(&self) -> Result<MemoryData, SinkError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(MemoryData::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, data: &MemoryData) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Append one entry to the `memory` array
    pub fn add_memory(&self, entry: Value) -> Result<(), SinkError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut data = self.load()?;
        data.memory.push(entry);
        self.save(&data)
    }

    /// Last `limit` entries, oldest first
    pub fn get_memory(&self, limit: usize) -> Result<Vec<Value>, SinkError> {
        let data = self.load()?;
        let skip = data.memory.len().saturating_sub(limit);
        Ok(data.memory.into_iter().skip(skip).collect())
    }
}

impl LogSink for MemoryDocument {
    fn append_log(&self, text: &str) -> Result<(), SinkError> {
        self.add_memory(serde_json::to_value(SinkRecord::now(text))?)
    }
}
