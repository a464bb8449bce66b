// Note quantization
// Snaps confident pitch frames to equal-tempered notes, everything else stays undefined

use serde::{Deserialize, Serialize};

use crate::events::types::{Note, PitchFrame, QuantizedFrame, QuantizedTrack};

/// Settings for pitch quantization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    /// Frames must have a voicing confidence strictly above this to get a note
    pub voicing_threshold: f32,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        QuantizerConfig {
            voicing_threshold: 0.5,
        }
    }
}

/// Quantize a single frame; None when unvoiced, unsure, or unrepresentable
pub fn quantize_frame(frame: &PitchFrame, config: &QuantizerConfig) -> Option<Note> {
    if frame.voicing_confidence <= config.voicing_threshold {
        return None;
    }

    frame.frequency_hz.and_then(Note::nearest)
}

/// Quantize a whole pitch contour, keeping one entry per input frame
pub fn quantize_track(frames: &[PitchFrame], config: &QuantizerConfig) -> QuantizedTrack {
    let track = QuantizedTrack {
        frames: frames
            .iter()
            .map(|frame| QuantizedFrame {
                frame_index: frame.frame_index,
                note: quantize_frame(frame, config),
            })
            .collect(),
    };

    log::debug!(
        "Quantized {} frames, {} with a defined note",
        track.len(),
        track.defined_count()
    );

    track
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(index: usize, frequency_hz: Option<f32>, confidence: f32) -> PitchFrame {
        PitchFrame {
            frame_index: index,
            time_seconds: index as f64 * 0.01,
            frequency_hz,
            voicing_confidence: confidence,
        }
    }

    #[test]
    fn test_confident_frame_snaps_to_note() {
        let config = QuantizerConfig::default();
        // A slightly flat E4 (329.63 Hz)
        let note = quantize_frame(&frame(0, Some(327.0), 0.9), &config).unwrap();

        assert_eq!(note.name(), "E4");
        assert!((note.frequency_hz() - 329.627_55).abs() < 1e-3);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let config = QuantizerConfig::default();

        assert_eq!(quantize_frame(&frame(0, Some(440.0), 0.5), &config), None);
        assert!(quantize_frame(&frame(0, Some(440.0), 0.51), &config).is_some());
    }

    #[test]
    fn test_missing_or_extreme_frequency_is_undefined() {
        let config = QuantizerConfig::default();

        assert_eq!(quantize_frame(&frame(0, None, 0.99), &config), None);
        assert_eq!(quantize_frame(&frame(0, Some(1.0), 0.99), &config), None);
    }

    #[test]
    fn test_track_keeps_frame_grid() {
        let frames = vec![
            frame(0, None, 0.0),
            frame(1, Some(261.6), 0.9),
            frame(2, Some(262.0), 0.3),
            frame(3, Some(263.0), 0.8),
        ];

        let track = quantize_track(&frames, &QuantizerConfig::default());

        assert_eq!(track.len(), 4);
        assert_eq!(track.frames[2].frame_index, 2);
        assert_eq!(track.note_at(0), None);
        assert_eq!(track.note_at(1).map(|n| n.name()), Some("C4".to_string()));
        assert_eq!(track.note_at(2), None);
        // Vibrato within the semitone collapses to the same note
        assert_eq!(track.note_at(1), track.note_at(3));
    }
}
