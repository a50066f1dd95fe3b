//! Append-only destinations for telemetry records.
//!
//! A sink only ever appends; readers get a snapshot and never mutate it.

use crate::TelemetryError;
use crate::record::TelemetryRecord;
use parking_lot::{Mutex, RwLock};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub trait TelemetrySink: Send + Sync {
    fn name(&self) -> &str;

    /// Append one record atomically with respect to other appends.
    fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError>;

    /// Every record written so far, oldest first.
    fn read_all(&self) -> Result<Vec<TelemetryRecord>, TelemetryError>;
}

/// Keeps records in memory. Used in tests and when telemetry is disabled
/// on disk.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: RwLock<Vec<TelemetryRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TelemetrySink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        self.records.write().push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<TelemetryRecord>, TelemetryError> {
        Ok(self.records.read().clone())
    }
}

/// One JSON object per line in a file. Appends from this process are
/// serialized by a mutex so lines never interleave.
///
/// All I/O is blocking `std::fs`; async callers go through
/// `spawn_blocking`.
#[derive(Debug)]
pub struct JsonlSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TelemetrySink for JsonlSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn append(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<TelemetryRecord>, TelemetryError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(line = index + 1, error = %e, "Skipping corrupted telemetry line");
                }
            }
        }
        debug!(records = records.len(), skipped, path = %self.path.display(), "Telemetry log read");
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CallStats;
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn record(user: &str) -> TelemetryRecord {
        TelemetryRecord::new(
            CallStats {
                user_id: user.into(),
                model: "openai/gpt-4o-mini".into(),
                prompt_tokens: 10,
                completion_tokens: 5,
                latency: Duration::from_millis(100),
                success: true,
                error: None,
            },
            0.0,
            Utc::now(),
        )
    }

    #[test]
    fn jsonl_round_trips_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonlSink::new(dir.path().join("logs").join("telemetry.jsonl"));
        assert!(sink.read_all().unwrap().is_empty());

        sink.append(&record("u1")).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(sink.path()).unwrap();
            writeln!(file, "{{truncated").unwrap();
        }
        sink.append(&record("u2")).unwrap();

        let records = sink.read_all().unwrap();
        let users: Vec<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, vec!["u1", "u2"]);
    }

    #[test]
    fn concurrent_appends_never_tear_lines() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(JsonlSink::new(dir.path().join("telemetry.jsonl")));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        sink.append(&record(&format!("user-{t}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(sink.read_all().unwrap().len(), 200);
    }

    #[test]
    fn memory_sink_snapshots() {
        let sink = MemorySink::new();
        sink.append(&record("u1")).unwrap();
        let mut snapshot = sink.read_all().unwrap();
        snapshot.clear();
        assert_eq!(sink.len(), 1);
    }
}
