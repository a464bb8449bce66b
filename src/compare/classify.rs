// Error classification
// Walks the reference note events along the warping path and reports what the performer got wrong

use serde::{Deserialize, Serialize};

use crate::compare::align::WarpingPath;
use crate::error::AnalysisError;
use crate::events::{NoteEvent, PerformanceError};

/// Matching and timing tolerances, in analysis frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// A performed note counts as the reference note's counterpart when it
    /// lies within this many frames of the aligned position
    pub match_window: usize,

    /// Change in drift between consecutive matched notes that is reported
    /// as a timing error
    pub timing_threshold: i64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            match_window: 5,
            timing_threshold: 20,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.timing_threshold < 0 {
            return Err(AnalysisError::InvalidConfig(
                "timing_threshold must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Turns note events plus an alignment into performance errors
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ClassifierConfig) -> Self {
        ErrorClassifier { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify every reference event.
    ///
    /// Both event lists must be in frame order. Errors come back ordered by
    /// reference time. Drift is `reference_frame - aligned_performed_frame`;
    /// a performance that falls behind makes drift smaller, so a drop of
    /// more than `timing_threshold` frames since the previous matched note
    /// is reported as late and a rise as early.
    pub fn classify(
        &self,
        reference: &[NoteEvent],
        performed: &[NoteEvent],
        path: &WarpingPath,
    ) -> Result<Vec<PerformanceError>, AnalysisError> {
        let mut errors = Vec::new();
        let mut previous_drift: Option<i64> = None;
        let mut matched = 0usize;

        for event in reference {
            let frame_p = path.performed_for(event.frame_index).ok_or_else(|| {
                AnalysisError::AlignmentDegenerate(format!(
                    "reference frame {} is not covered by the warping path",
                    event.frame_index
                ))
            })?;

            let Some(played) = self.nearest_performed(performed, frame_p) else {
                errors.push(PerformanceError::missed_note(event.time_seconds));
                continue;
            };
            matched += 1;

            if played.note != event.note {
                errors.push(PerformanceError::wrong_pitch(event.time_seconds, event.note, played.note));
            }

            let drift = event.frame_index as i64 - frame_p as i64;
            if let Some(previous) = previous_drift {
                let deviation = previous - drift;
                if deviation > self.config.timing_threshold {
                    errors.push(PerformanceError::note_late(event.time_seconds));
                } else if deviation < -self.config.timing_threshold {
                    errors.push(PerformanceError::note_early(event.time_seconds));
                }
            }
            previous_drift = Some(drift);
        }

        for error in &errors {
            log::debug!("{} at {:.3}s: {}", error.kind, error.time_seconds, error.message);
        }
        log::debug!(
            "Classified {} reference notes ({} matched, {} errors)",
            reference.len(),
            matched,
            errors.len()
        );

        Ok(errors)
    }

    /// Closest performed event to `frame_p` within the match window; ties go to the earlier event
    fn nearest_performed<'a>(&self, performed: &'a [NoteEvent], frame_p: usize) -> Option<&'a NoteEvent> {
        let window = self.config.match_window;
        let start = performed.partition_point(|e| e.frame_index + window < frame_p);

        performed[start..]
            .iter()
            .take_while(|e| e.frame_index <= frame_p + window)
            .min_by_key(|e| e.frame_index.abs_diff(frame_p))
    }
}
