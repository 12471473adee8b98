//! Append-only audit log of accepted matches.
//!
//! One CSV row per accepted match: `identity,NN.NN%,YYYY-MM-DD HH:MM:SS`.
//! Fields are quoted only when they contain a comma or quote.

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("event log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("event log CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("malformed event log row {row}: {reason}")]
    Malformed { row: u64, reason: String },
}

/// A persisted record of one accepted match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    pub identity: String,
    pub confidence: f32,
    /// Local wall-clock time, truncated to whole seconds.
    pub timestamp: NaiveDateTime,
}

impl AlertEvent {
    pub fn new(identity: impl Into<String>, confidence: f32, now: DateTime<Local>) -> Self {
        let naive = now.naive_local();
        Self {
            identity: identity.into(),
            confidence,
            timestamp: naive.with_nanosecond(0).unwrap_or(naive),
        }
    }

    /// Confidence as persisted, e.g. `"70.00%"`.
    pub fn confidence_field(&self) -> String {
        format!("{:.2}%", self.confidence)
    }

    /// Timestamp as persisted, e.g. `"2024-01-15 10:00:00"`.
    pub fn timestamp_field(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Durable sink for accepted matches.
pub trait EventRecorder: Send + Sync {
    fn record(&self, event: &AlertEvent) -> Result<(), RecorderError>;
}

/// CSV event log opened in append mode for every record.
///
/// Each row is encoded in memory first and written with a single append,
/// so a failed write never touches rows already in the file. Appends from
/// one recorder are serialized; share one instance per log file.
#[derive(Debug)]
pub struct CsvEventRecorder {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvEventRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(event: &AlertEvent) -> Result<Vec<u8>, RecorderError> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record([
            event.identity.as_str(),
            event.confidence_field().as_str(),
            event.timestamp_field().as_str(),
        ])?;
        writer
            .into_inner()
            .map_err(|e| RecorderError::Io(e.into_error()))
    }
}

impl EventRecorder for CsvEventRecorder {
    fn record(&self, event: &AlertEvent) -> Result<(), RecorderError> {
        let row = Self::encode(event)?;

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&row)?;
        file.flush()?;

        tracing::info!(
            identity = %event.identity,
            confidence = %event.confidence_field(),
            timestamp = %event.timestamp_field(),
            path = %self.path.display(),
            "recorded event"
        );
        Ok(())
    }
}

/// Read back every event in a CSV event log. A missing file has no events.
pub fn read_events(path: &Path) -> Result<Vec<AlertEvent>, RecorderError> {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(file);

    let mut events = Vec::new();
    for (i, row) in reader.records().enumerate() {
        let row = row?;
        let row_no = i as u64 + 1;
        let malformed = |reason: String| RecorderError::Malformed { row: row_no, reason };

        if row.len() != 3 {
            return Err(malformed(format!("expected 3 fields, got {}", row.len())));
        }

        let confidence = row[1]
            .strip_suffix('%')
            .ok_or_else(|| malformed(format!("confidence without '%': {:?}", &row[1])))?
            .parse::<f32>()
            .map_err(|e| malformed(format!("confidence {:?}: {e}", &row[1])))?;

        let timestamp = NaiveDateTime::parse_from_str(&row[2], TIMESTAMP_FORMAT)
            .map_err(|e| malformed(format!("timestamp {:?}: {e}", &row[2])))?;

        events.push(AlertEvent {
            identity: row[0].to_string(),
            confidence,
            timestamp,
        });
    }

    Ok(events)
}
