// Command handlers
// File-level entry points behind the command-line front end

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::{Decoder, PcmBuffer, WavDecoder};
use crate::compare::beats_from_start;
use crate::events::{ErrorKind, PerformanceError, TrackRole};
use crate::pipeline::{self, Comparator, EngineConfig, TraceStage, TraceWriter, TrackAnalysis};

#[derive(Debug, Serialize)]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl<E: std::fmt::Display> From<E> for CommandError {
    fn from(error: E) -> Self {
        CommandError {
            message: error.to_string(),
        }
    }
}

type CommandResult<T> = Result<T, CommandError>;

// ==================== COMPARE ====================

#[derive(Debug, Clone, Deserialize)]
pub struct CompareInput {
    pub reference_path: PathBuf,
    pub performed_path: PathBuf,
    pub config_path: Option<PathBuf>,
    pub trace_path: Option<PathBuf>,

    /// Tempo of the score, used to place errors in beats
    pub bpm: Option<f64>,

    /// Return the whole comparison instead of just the errors
    pub full: bool,
}

/// A performance error as handed to downstream consumers
#[derive(Debug, Clone, Serialize)]
pub struct ReportedError {
    pub kind: ErrorKind,
    pub time_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub beats_from_start: Option<f64>,
    pub message: String,
}

impl ReportedError {
    fn new(error: &PerformanceError, bpm: Option<f64>) -> Self {
        ReportedError {
            kind: error.kind,
            time_seconds: error.time_seconds,
            beats_from_start: bpm.map(|bpm| beats_from_start(error.time_seconds, bpm)),
            message: error.message.clone(),
        }
    }
}

/// Decode both recordings and compare them
pub async fn compare(input: CompareInput) -> CommandResult<serde_json::Value> {
    let config = load_config(input.config_path.as_deref())?;
    let trace = input.trace_path.clone().map(TraceWriter::new);

    if let Some(trace) = &trace {
        log::info!("Tracing run {} to {}", trace.run_id(), trace.path().display());
        trace.record(TraceStage::Decode, 0.0, "Decoding recordings", None);
    }

    let reference = decode_file(&input.reference_path).await?;
    let performed = decode_file(&input.performed_path).await?;

    if let Some(trace) = &trace {
        trace.record(
            TraceStage::Decode,
            1.0,
            "Decoded recordings",
            Some(serde_json::json!({
                "reference_secs": reference.duration_secs(),
                "performed_secs": performed.duration_secs(),
            })),
        );
    }

    let mut comparator = Comparator::new(config)?;
    if let Some(trace) = trace {
        comparator = comparator.with_trace(trace);
    }

    let comparison = comparator.compare_async(reference, performed).await?;

    if input.full {
        return Ok(serde_json::to_value(&comparison)?);
    }

    let errors: Vec<ReportedError> = comparison
        .errors
        .iter()
        .map(|e| ReportedError::new(e, input.bpm))
        .collect();
    Ok(serde_json::to_value(errors)?)
}

// ==================== INSPECT ====================

/// Analyze a single recording without comparing it
pub async fn inspect(path: PathBuf, config_path: Option<PathBuf>) -> CommandResult<TrackAnalysis> {
    let config = load_config(config_path.as_deref())?;
    let pcm = decode_file(&path).await?;

    let analysis = tokio::task::spawn_blocking(move || {
        pipeline::analyze_track(&pcm, TrackRole::Reference, &config)
    })
    .await??;

    Ok(analysis)
}

fn load_config(path: Option<&Path>) -> CommandResult<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path).map_err(|e| CommandError {
            message: format!("Failed to load config {}: {}", path.display(), e),
        }),
        None => Ok(EngineConfig::default()),
    }
}

async fn decode_file(path: &Path) -> CommandResult<PcmBuffer> {
    let bytes = tokio::fs::read(path).await.map_err(|e| CommandError {
        message: format!("Failed to read {}: {}", path.display(), e),
    })?;

    WavDecoder.decode(&bytes).map_err(|e| CommandError {
        message: format!("Failed to decode {}: {}", path.display(), e),
    })
}
