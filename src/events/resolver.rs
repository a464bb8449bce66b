// Onset resolution
// Turns onset candidates into note events by looking past the attack transient for a pitch

use serde::{Deserialize, Serialize};

use crate::audio::AnalysisConfig;
use crate::events::types::{Note, NoteEvent, OnsetCandidate, QuantizedTrack};

/// Settings for onset resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Frames inspected per onset, counting the onset frame itself
    pub lookahead_frames: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            lookahead_frames: 6,
        }
    }
}

/// Resolve each onset to a note event, dropping onsets without a pitch.
///
/// The look-ahead window is scanned from its far end back toward the onset,
/// so the settled pitch after the attack wins over the transient at the onset
/// itself. Window frames past the end of the track clamp to the last frame.
pub fn resolve_onsets(
    onsets: &[OnsetCandidate],
    track: &QuantizedTrack,
    analysis: &AnalysisConfig,
    config: &ResolverConfig,
) -> Vec<NoteEvent> {
    let mut events = Vec::with_capacity(onsets.len());
    let mut discarded = 0;

    for onset in onsets {
        match resolve_pitch(onset.frame_index, track, config.lookahead_frames) {
            Some(note) => events.push(NoteEvent {
                frame_index: onset.frame_index,
                time_seconds: analysis.frame_time(onset.frame_index),
                note,
            }),
            None => discarded += 1,
        }
    }

    log::debug!(
        "Resolved {} note events from {} onsets ({} without pitch discarded)",
        events.len(),
        onsets.len(),
        discarded
    );

    events
}

/// Farthest defined note in `[onset, onset + lookahead)`, scanning backward
fn resolve_pitch(onset_frame: usize, track: &QuantizedTrack, lookahead: usize) -> Option<Note> {
    let last = track.len().checked_sub(1)?;

    (0..lookahead)
        .rev()
        .map(|offset| (onset_frame + offset).min(last))
        .find_map(|frame| track.note_at(frame))
}
