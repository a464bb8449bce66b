// Comparison progress tracing
// Append-only JSONL trace of the stages of each comparison run

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Stages of one comparison, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStage {
    Decode,
    FeatureExtraction,
    Alignment,
    Classification,
}

impl fmt::Display for TraceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceStage::Decode => "decode",
            TraceStage::FeatureExtraction => "feature_extraction",
            TraceStage::Alignment => "alignment",
            TraceStage::Classification => "classification",
        };
        f.write_str(name)
    }
}

/// One line of the trace file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Comparison this entry belongs to
    pub run_id: Uuid,

    /// RFC 3339 timestamp
    pub timestamp: String,

    pub stage: TraceStage,

    /// Progress within the stage [0.0, 1.0]
    pub progress: f32,

    pub message: String,

    /// Stage-specific details (frame counts, path length, error counts)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    pub fn new(run_id: Uuid, stage: TraceStage, progress: f32, message: impl Into<String>) -> Self {
        TraceEntry {
            run_id,
            timestamp: Utc::now().to_rfc3339(),
            stage,
            progress: progress.clamp(0.0, 1.0),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Appends trace entries for one comparison run to a JSONL file.
/// Feature extraction runs on two threads, so writes are serialized.
#[derive(Debug)]
pub struct TraceWriter {
    file_path: PathBuf,
    run_id: Uuid,
    lock: Mutex<()>,
}

impl TraceWriter {
    /// Writer for a fresh run id
    pub fn new(file_path: PathBuf) -> Self {
        Self::with_run_id(file_path, Uuid::new_v4())
    }

    pub fn with_run_id(file_path: PathBuf, run_id: Uuid) -> Self {
        TraceWriter {
            file_path,
            run_id,
            lock: Mutex::new(()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Start an entry for `stage` stamped with this writer's run id
    pub fn entry(&self, stage: TraceStage, progress: f32, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.run_id, stage, progress, message)
    }

    /// Append an entry to the file, creating it if needed
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let json_line = entry.to_json_line()?;

        let _guard = self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Build and append an entry; failures are logged, not propagated
    pub fn record(&self, stage: TraceStage, progress: f32, message: impl Into<String>, data: Option<serde_json::Value>) {
        let mut entry = self.entry(stage, progress, message);
        entry.data = data;
        if let Err(e) = self.write(&entry) {
            log::warn!("Failed to write {} trace entry to {}: {}", stage, self.file_path.display(), e);
        }
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(line)?);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_progress_clamping() {
        let id = Uuid::new_v4();
        assert_eq!(TraceEntry::new(id, TraceStage::Decode, -0.5, "x").progress, 0.0);
        assert_eq!(TraceEntry::new(id, TraceStage::Decode, 1.5, "x").progress, 1.0);
    }

    #[test]
    fn test_stage_wire_names() {
        let json = serde_json::to_string(&TraceStage::FeatureExtraction).unwrap();
        assert_eq!(json, "\"feature_extraction\"");
        assert_eq!(TraceStage::Classification.to_string(), "classification");
    }

    #[test]
    fn test_writer_stamps_run_id() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(trace_path.clone());

        writer.record(TraceStage::Alignment, 0.0, "Aligning", None);
        writer.record(
            TraceStage::Alignment,
            1.0,
            "Aligned",
            Some(serde_json::json!({ "path_length": 42 })),
        );

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.run_id == writer.run_id()));
        assert_eq!(entries[1].stage, TraceStage::Alignment);
        assert_eq!(entries[1].data.as_ref().unwrap()["path_length"], 42);
    }

    #[test]
    fn test_runs_append_to_one_file() {
        let temp_dir = TempDir::new().unwrap();
        let trace_path = temp_dir.path().join("trace.jsonl");

        let first = TraceWriter::new(trace_path.clone());
        let second = TraceWriter::new(trace_path.clone());
        first.record(TraceStage::Decode, 1.0, "Decoded", None);
        second.record(TraceStage::Decode, 1.0, "Decoded", None);

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_ne!(entries[0].run_id, entries[1].run_id);
    }

    #[test]
    fn test_json_line_format() {
        let entry = TraceEntry::new(Uuid::new_v4(), TraceStage::Classification, 0.5, "Testing")
            .with_data(serde_json::json!({ "errors": 3 }));
        let json_line = entry.to_json_line().unwrap();

        assert!(json_line.ends_with('\n'));
        let parsed: TraceEntry = serde_json::from_str(json_line.trim()).unwrap();
        assert_eq!(parsed.stage, TraceStage::Classification);
        assert_eq!(parsed.run_id, entry.run_id);
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let writer = TraceWriter::new(temp_dir.path().join("missing").join("trace.jsonl"));
        let entry = writer.entry(TraceStage::Decode, 0.0, "Start");

        assert!(matches!(writer.write(&entry), Err(TraceError::IoError(_))));
    }
}
