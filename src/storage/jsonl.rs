//! Append-only JSON-lines sink

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::{LogSink, SinkError, SinkRecord};

/// Writes one [`SinkRecord`] per line to a file
pub struct JsonlSink {
    path: PathBuf,
    /// Serializes writers so lines never interleave
    write_lock: Mutex<()>,
}

impl JsonlSink {
    /// Create a sink at `path`, creating parent directories as needed
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last `limit` records, oldest first. Malformed lines are skipped.
    pub fn recent(&self, limit: usize) -> Result<Vec<SinkRecord>, SinkError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let records: Vec<SinkRecord> = contents
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).collect())
    }
}

impl LogSink for JsonlSink {
    fn append_log(&self, text: &str) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(&SinkRecord::now(text))?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_recent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("logs").join("agent.jsonl")).unwrap();

        sink.append_log("tick 1").unwrap();
        sink.append_log("tick 2").unwrap();
        sink.append_log("tick 3").unwrap();

        let recent = sink.recent(2).unwrap();
        let texts: Vec<&str> = recent.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["tick 2", "tick 3"]);
    }

    #[test]
    fn test_recent_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("never-written.jsonl")).unwrap();
        assert!(sink.recent(10).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.jsonl");
        let sink = JsonlSink::new(&path).unwrap();
        sink.append_log("good").unwrap();
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(b"not json\n")
            .unwrap();

        let recent = sink.recent(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "good");
    }

    #[test]
    fn test_append_to_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path()).unwrap();
        assert!(matches!(sink.append_log("x"), Err(SinkError::Io(_))));
    }
}
