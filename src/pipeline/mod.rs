// Comparison pipeline
// Runs feature extraction for both recordings, then alignment and error classification

pub mod config;
pub mod trace;

pub use config::{ConfigError, EngineConfig};
pub use trace::{read_trace_file, TraceEntry, TraceError, TraceStage, TraceWriter};

use serde::Serialize;
use std::sync::Arc;
use std::thread;
use thiserror::Error;

use crate::audio::{detect_onsets, track_pitch, AudioError, PcmBuffer};
use crate::compare::{align_tracks, ErrorClassifier, WarpingPath};
use crate::error::AnalysisError;
use crate::events::{
    quantize_track, resolve_onsets, NoteEvent, OnsetCandidate, PerformanceError, PitchFrame,
    QuantizedTrack, TrackRole,
};

#[derive(Debug, Error)]
pub enum CompareError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error("Feature extraction task failed: {0}")]
    TaskFailed(String),
}

/// Everything extracted from one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackAnalysis {
    pub role: TrackRole,
    pub pitch_frames: Vec<PitchFrame>,
    pub quantized: QuantizedTrack,
    pub onsets: Vec<OnsetCandidate>,
    pub events: Vec<NoteEvent>,
}

/// Result of comparing a performance against its reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub errors: Vec<PerformanceError>,
    pub reference: TrackAnalysis,
    pub performed: TrackAnalysis,
    pub path: WarpingPath,

    /// Time in seconds of every analysis frame, shared by both tracks
    pub frame_times: Vec<f64>,
}

/// Per-recording stages: resample, pitch, onsets, quantize, resolve
pub fn analyze_track(pcm: &PcmBuffer, role: TrackRole, config: &EngineConfig) -> Result<TrackAnalysis, CompareError> {
    let analysis = &config.analysis;
    let pcm = pcm.resampled(analysis.sample_rate)?;

    let pitch_frames = track_pitch(&pcm.samples, analysis, &config.pitch)?;
    let onsets = detect_onsets(&pcm.samples, analysis, &config.onset)?;
    let quantized = quantize_track(&pitch_frames, &config.quantizer);
    let events = resolve_onsets(&onsets, &quantized, analysis, &config.resolver);

    log::info!(
        "Analyzed {} track: {} frames, {} voiced, {} onsets, {} note events",
        role,
        pitch_frames.len(),
        quantized.defined_count(),
        onsets.len(),
        events.len()
    );

    Ok(TrackAnalysis {
        role,
        pitch_frames,
        quantized,
        onsets,
        events,
    })
}

/// Compares recordings under one configuration, optionally tracing each stage
#[derive(Debug, Clone)]
pub struct Comparator {
    config: Arc<EngineConfig>,
    trace: Option<Arc<TraceWriter>>,
}

impl Comparator {
    pub fn new(config: EngineConfig) -> Result<Self, AnalysisError> {
        config.validate()?;
        Ok(Comparator {
            config: Arc::new(config),
            trace: None,
        })
    }

    pub fn with_trace(mut self, trace: TraceWriter) -> Self {
        self.trace = Some(Arc::new(trace));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Compare on the calling thread, extracting both tracks on scoped threads
    pub fn compare(&self, reference: &PcmBuffer, performed: &PcmBuffer) -> Result<Comparison, CompareError> {
        let (reference, performed) = thread::scope(|s| {
            let reference = s.spawn(|| self.analyze(reference, TrackRole::Reference));
            let performed = s.spawn(|| self.analyze(performed, TrackRole::Performed));
            (join_thread(reference), join_thread(performed))
        });

        self.finish(reference??, performed??)
    }

    /// Compare from async code; all numeric work runs on the blocking pool
    pub async fn compare_async(&self, reference: PcmBuffer, performed: PcmBuffer) -> Result<Comparison, CompareError> {
        let reference_task = {
            let this = self.clone();
            tokio::task::spawn_blocking(move || this.analyze(&reference, TrackRole::Reference))
        };
        let performed_task = {
            let this = self.clone();
            tokio::task::spawn_blocking(move || this.analyze(&performed, TrackRole::Performed))
        };

        let (reference, performed) = tokio::join!(reference_task, performed_task);
        let reference = reference.map_err(|e| CompareError::TaskFailed(e.to_string()))??;
        let performed = performed.map_err(|e| CompareError::TaskFailed(e.to_string()))??;

        let this = self.clone();
        tokio::task::spawn_blocking(move || this.finish(reference, performed))
            .await
            .map_err(|e| CompareError::TaskFailed(e.to_string()))?
    }

    fn analyze(&self, pcm: &PcmBuffer, role: TrackRole) -> Result<TrackAnalysis, CompareError> {
        self.record(
            TraceStage::FeatureExtraction,
            0.0,
            format!("Extracting {} features", role),
            Some(serde_json::json!({ "track": role, "duration_secs": pcm.duration_secs() })),
        );

        let analysis = analyze_track(pcm, role, &self.config)?;

        self.record(
            TraceStage::FeatureExtraction,
            1.0,
            format!("Extracted {} features", role),
            Some(serde_json::json!({
                "track": role,
                "frames": analysis.pitch_frames.len(),
                "voiced_frames": analysis.quantized.defined_count(),
                "onsets": analysis.onsets.len(),
                "note_events": analysis.events.len(),
            })),
        );

        Ok(analysis)
    }

    /// Join point: align the two tracks and classify errors
    fn finish(&self, reference: TrackAnalysis, performed: TrackAnalysis) -> Result<Comparison, CompareError> {
        self.record(TraceStage::Alignment, 0.0, "Aligning tracks", None);
        let path = align_tracks(&reference.quantized, &performed.quantized, &self.config.align)?;
        self.record(
            TraceStage::Alignment,
            1.0,
            "Aligned tracks",
            Some(serde_json::json!({ "path_length": path.len() })),
        );

        self.record(TraceStage::Classification, 0.0, "Classifying note events", None);
        let classifier = ErrorClassifier::with_config(self.config.classifier.clone());
        let errors = classifier.classify(&reference.events, &performed.events, &path)?;
        self.record(
            TraceStage::Classification,
            1.0,
            format!("Found {} performance errors", errors.len()),
            Some(serde_json::json!({ "errors": errors.len() })),
        );

        log::info!(
            "Comparison finished: {} reference notes, {} performed notes, {} errors",
            reference.events.len(),
            performed.events.len(),
            errors.len()
        );

        let frame_count = reference.pitch_frames.len().max(performed.pitch_frames.len());

        Ok(Comparison {
            errors,
            frame_times: self.config.analysis.frame_times(frame_count),
            reference,
            performed,
            path,
        })
    }

    fn record(&self, stage: TraceStage, progress: f32, message: impl Into<String>, data: Option<serde_json::Value>) {
        if let Some(trace) = &self.trace {
            trace.record(stage, progress, message, data);
        }
    }
}

fn join_thread<T>(handle: thread::ScopedJoinHandle<'_, T>) -> Result<T, CompareError> {
    handle
        .join()
        .map_err(|_| CompareError::TaskFailed("feature extraction thread panicked".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ErrorKind;

    const LEAD_IN_SECS: f32 = 0.3;
    const NOTE_SECS: f32 = 0.4;
    const GAP_SECS: f32 = 0.1;

    /// Sine melody with short fades, after a stretch of silence.
    /// `-` is a rest as long as a note.
    fn melody(names: &[&str], sample_rate: u32) -> PcmBuffer {
        melody_with_pauses(names, &[], sample_rate)
    }

    /// Like `melody`, with `(note index, seconds)` of extra silence before the given notes
    fn melody_with_pauses(names: &[&str], pauses: &[(usize, f32)], sample_rate: u32) -> PcmBuffer {
        let rate = sample_rate as f32;
        let silence = |seconds: f32| std::iter::repeat(0.0f32).take((seconds * rate) as usize);
        let mut samples: Vec<f32> = silence(LEAD_IN_SECS).collect();

        for (index, name) in names.iter().enumerate() {
            for &(_, seconds) in pauses.iter().filter(|(at, _)| *at == index) {
                samples.extend(silence(seconds));
            }

            if *name == "-" {
                samples.extend(silence(NOTE_SECS));
            } else {
                let frequency = name.parse::<crate::events::Note>().unwrap().frequency_hz();
                let length = (NOTE_SECS * rate) as usize;
                let fade = (0.01 * rate) as usize;
                for i in 0..length {
                    let envelope = (i.min(length - 1 - i) as f32 / fade as f32).min(1.0);
                    let phase = 2.0 * std::f32::consts::PI * frequency * i as f32 / rate;
                    samples.push(0.5 * envelope * phase.sin());
                }
            }
            samples.extend(silence(GAP_SECS));
        }

        PcmBuffer::new(samples, sample_rate)
    }

    fn kinds(comparison: &Comparison) -> Vec<ErrorKind> {
        comparison.errors.iter().map(|e| e.kind).collect()
    }

    fn note_names(events: &[NoteEvent]) -> Vec<String> {
        events.iter().map(|e| e.note.name()).collect()
    }

    fn comparator() -> Comparator {
        Comparator::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_identical_recordings_have_no_errors() {
        let reference = melody(&["C4", "E4", "G4", "C5"], 22050);

        let comparison = comparator().compare(&reference, &reference).unwrap();

        assert_eq!(note_names(&comparison.reference.events), ["C4", "E4", "G4", "C5"]);
        assert!(comparison.errors.is_empty(), "{:?}", comparison.errors);
        assert_eq!(comparison.path.len(), comparison.reference.pitch_frames.len());
        assert!(comparison.path.pairs().iter().all(|&(r, p)| r == p));
        assert_eq!(comparison.frame_times.len(), comparison.reference.pitch_frames.len());
    }

    #[test]
    fn test_wrong_note_is_reported_high() {
        let reference = melody(&["C4", "E4", "G4"], 22050);
        let performed = melody(&["C4", "F4", "G4"], 22050);

        let comparison = comparator().compare(&reference, &performed).unwrap();

        assert_eq!(note_names(&comparison.reference.events), ["C4", "E4", "G4"]);
        assert_eq!(note_names(&comparison.performed.events), ["C4", "F4", "G4"]);
        assert_eq!(kinds(&comparison), [ErrorKind::PitchTooHigh], "{:?}", comparison.errors);

        let error = &comparison.errors[0];
        assert_eq!(error.time_seconds, comparison.reference.events[1].time_seconds);
        assert!(error.message.contains("E4") && error.message.contains("F4"));
    }

    #[test]
    fn test_silent_note_is_reported_missed() {
        let reference = melody(&["C4", "E4", "G4", "C5"], 22050);
        let performed = melody(&["C4", "-", "G4", "C5"], 22050);

        let comparison = comparator().compare(&reference, &performed).unwrap();

        assert_eq!(note_names(&comparison.performed.events), ["C4", "G4", "C5"]);
        assert_eq!(kinds(&comparison), [ErrorKind::MissedNote], "{:?}", comparison.errors);
        assert_eq!(
            comparison.errors[0].time_seconds,
            comparison.reference.events[1].time_seconds
        );
    }

    #[test]
    fn test_delayed_entry_is_reported_late_once() {
        let reference = melody(&["C4", "E4", "G4", "C5"], 22050);
        // About 30 frames of extra silence before E4; everything after keeps the new offset
        let performed = melody_with_pauses(&["C4", "E4", "G4", "C5"], &[(1, 0.7)], 22050);

        let comparison = comparator().compare(&reference, &performed).unwrap();

        assert_eq!(note_names(&comparison.performed.events), ["C4", "E4", "G4", "C5"]);
        assert_eq!(kinds(&comparison), [ErrorKind::NoteLate], "{:?}", comparison.errors);
        assert_eq!(
            comparison.errors[0].time_seconds,
            comparison.reference.events[1].time_seconds
        );
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let reference = melody(&["D4", "F#4", "A4"], 22050);
        let performed = melody(&["D4", "G4", "A4"], 22050);
        let comparator = comparator();

        let first = comparator.compare(&reference, &performed).unwrap();
        let second = comparator.compare(&reference, &performed).unwrap();

        assert_eq!(
            serde_json::to_string(&first.errors).unwrap(),
            serde_json::to_string(&second.errors).unwrap()
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_silent_performance_aborts() {
        let reference = melody(&["C4", "E4"], 22050);
        let silence = PcmBuffer::new(vec![0.0; 22050], 22050);

        let result = comparator().compare(&reference, &silence);

        assert!(matches!(
            result,
            Err(CompareError::Analysis(AnalysisError::NoVoicedContent {
                track: TrackRole::Performed
            }))
        ));
    }

    #[test]
    fn test_empty_reference_aborts() {
        let performed = melody(&["C4"], 22050);
        let result = comparator().compare(&PcmBuffer::new(Vec::new(), 22050), &performed);
        assert!(matches!(
            result,
            Err(CompareError::Analysis(AnalysisError::AlignmentDegenerate(_)))
        ));
    }

    #[test]
    fn test_recordings_share_one_frame_grid() {
        let reference = melody(&["A3", "C4"], 22050);
        let performed = melody(&["A3", "C4"], 44100);

        let comparison = comparator().compare(&reference, &performed).unwrap();

        assert_eq!(
            comparison.reference.pitch_frames.len(),
            comparison.performed.pitch_frames.len()
        );
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.analysis.hop_size = 0;
        assert!(Comparator::new(config).is_err());
    }

    #[test]
    fn test_trace_records_each_stage() {
        let dir = tempfile::TempDir::new().unwrap();
        let trace_path = dir.path().join("trace.jsonl");
        let writer = TraceWriter::new(trace_path.clone());
        let run_id = writer.run_id();
        let reference = melody(&["C4", "E4"], 22050);

        comparator().with_trace(writer).compare(&reference, &reference).unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        assert!(entries.iter().all(|e| e.run_id == run_id));
        let count = |stage: TraceStage| entries.iter().filter(|e| e.stage == stage).count();
        assert_eq!(count(TraceStage::FeatureExtraction), 4);
        assert_eq!(count(TraceStage::Alignment), 2);
        assert_eq!(count(TraceStage::Classification), 2);
        assert_eq!(entries.last().map(|e| e.stage), Some(TraceStage::Classification));
    }

    #[tokio::test]
    async fn test_async_matches_sync() {
        let reference = melody(&["E4", "G4", "B4"], 22050);
        let performed = melody(&["E4", "G4", "C5"], 22050);
        let comparator = comparator();

        let sync = comparator.compare(&reference, &performed).unwrap();
        let async_result = comparator.compare_async(reference, performed).await.unwrap();

        assert_eq!(sync, async_result);
    }

    #[tokio::test]
    async fn test_async_propagates_failure() {
        let reference = melody(&["C4"], 22050);
        let silence = PcmBuffer::new(vec![0.0; 4096], 22050);

        let result = comparator().compare_async(silence, reference).await;

        assert!(matches!(
            result,
            Err(CompareError::Analysis(AnalysisError::NoVoicedContent {
                track: TrackRole::Reference
            }))
        ));
    }
}
