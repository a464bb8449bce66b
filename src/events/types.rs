// Note and track types
// Per-frame pitch data, note events, and the performance errors reported to callers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// An equal-tempered note (A4 = 440 Hz), identified by its MIDI number.
///
/// Two notes are the same note name exactly when their MIDI numbers match,
/// so pitch comparisons never depend on raw Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Note(u8);

impl Note {
    pub const HIGHEST_MIDI: u8 = 127;

    pub fn from_midi(midi: u8) -> Option<Note> {
        (midi <= Self::HIGHEST_MIDI).then_some(Note(midi))
    }

    /// Nearest note to a frequency, or None when it falls outside MIDI 0..=127
    pub fn nearest(frequency_hz: f32) -> Option<Note> {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return None;
        }

        let midi = (12.0 * (frequency_hz / 440.0).log2() + 69.0).round();
        if midi < 0.0 || midi > Self::HIGHEST_MIDI as f32 {
            return None;
        }

        Some(Note(midi as u8))
    }

    pub fn midi(&self) -> u8 {
        self.0
    }

    /// Canonical frequency of this note in Hz
    pub fn frequency_hz(&self) -> f32 {
        440.0 * 2f32.powf((self.0 as f32 - 69.0) / 12.0)
    }

    /// Scientific pitch name, e.g. `C4`, `F#3`
    pub fn name(&self) -> String {
        let octave = self.0 as i32 / 12 - 1;
        format!("{}{}", NOTE_NAMES[self.0 as usize % 12], octave)
    }
}

impl TryFrom<u8> for Note {
    type Error = String;

    fn try_from(midi: u8) -> Result<Self, Self::Error> {
        Note::from_midi(midi).ok_or_else(|| format!("MIDI note {} is out of range", midi))
    }
}

impl From<Note> for u8 {
    fn from(note: Note) -> u8 {
        note.0
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Note {
    type Err = String;

    /// Parse names like `C4`, `F#3`, `Bb2`, `C-1`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| "empty note name".to_string())?;

        let base = match letter {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(format!("invalid note letter in '{}'", s)),
        };

        let rest = chars.as_str();
        let (accidental, octave_str) = match rest.chars().next() {
            Some('#') => (1, &rest[1..]),
            Some('b') => (-1, &rest[1..]),
            _ => (0, rest),
        };

        let octave: i32 = octave_str
            .parse()
            .map_err(|_| format!("invalid octave in '{}'", s))?;

        let midi = (octave + 1) * 12 + base + accidental;
        u8::try_from(midi)
            .ok()
            .and_then(Note::from_midi)
            .ok_or_else(|| format!("note '{}' is outside the MIDI range", s))
    }
}

/// Which side of a comparison a track belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackRole {
    Reference,
    Performed,
}

impl fmt::Display for TrackRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackRole::Reference => f.write_str("reference"),
            TrackRole::Performed => f.write_str("performed"),
        }
    }
}

/// Raw pitch estimate for one analysis frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchFrame {
    pub frame_index: usize,

    /// Frame center in seconds
    pub time_seconds: f64,

    /// Estimated fundamental, None when the frame is silent or out of band
    pub frequency_hz: Option<f32>,

    /// Voicing confidence [0.0, 1.0]
    /// Low-confidence frames are kept so the raw contour stays inspectable
    pub voicing_confidence: f32,
}

/// One frame of a quantized pitch track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedFrame {
    pub frame_index: usize,
    pub note: Option<Note>,
}

impl QuantizedFrame {
    pub fn quantized_frequency_hz(&self) -> Option<f32> {
        self.note.map(|n| n.frequency_hz())
    }
}

/// Note-snapped pitch contour, one entry per analysis frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizedTrack {
    pub frames: Vec<QuantizedFrame>,
}

impl QuantizedTrack {
    /// Build a track from per-frame notes, indexing frames from 0
    pub fn from_notes(notes: impl IntoIterator<Item = Option<Note>>) -> Self {
        QuantizedTrack {
            frames: notes
                .into_iter()
                .enumerate()
                .map(|(frame_index, note)| QuantizedFrame { frame_index, note })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn note_at(&self, frame_index: usize) -> Option<Note> {
        self.frames.get(frame_index).and_then(|f| f.note)
    }

    /// Number of frames with a defined note
    pub fn defined_count(&self) -> usize {
        self.frames.iter().filter(|f| f.note.is_some()).count()
    }
}

/// Attack candidate from the novelty curve, not yet checked for pitch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnsetCandidate {
    pub frame_index: usize,
}

/// An onset that resolved to a definite note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub frame_index: usize,
    pub time_seconds: f64,
    pub note: Note,
}

impl NoteEvent {
    pub fn note_frequency_hz(&self) -> f32 {
        self.note.frequency_hz()
    }
}

/// Kind of discrepancy between the reference and the performance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    MissedNote,
    PitchTooHigh,
    PitchTooLow,
    NoteEarly,
    NoteLate,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 5] = [
        ErrorKind::MissedNote,
        ErrorKind::PitchTooHigh,
        ErrorKind::PitchTooLow,
        ErrorKind::NoteEarly,
        ErrorKind::NoteLate,
    ];

    /// Wire name, e.g. `missed-note`
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissedNote => "missed-note",
            ErrorKind::PitchTooHigh => "pitch-too-high",
            ErrorKind::PitchTooLow => "pitch-too-low",
            ErrorKind::NoteEarly => "note-early",
            ErrorKind::NoteLate => "note-late",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single time-stamped discrepancy; never modified after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceError {
    pub kind: ErrorKind,

    /// Reference time of the note the error refers to
    pub time_seconds: f64,

    pub message: String,
}

impl PerformanceError {
    pub fn missed_note(time_seconds: f64) -> Self {
        PerformanceError {
            kind: ErrorKind::MissedNote,
            time_seconds,
            message: "A note that should have been played was not played.".to_string(),
        }
    }

    /// Wrong note; the direction follows the canonical note frequencies
    pub fn wrong_pitch(time_seconds: f64, expected: Note, played: Note) -> Self {
        let (kind, direction) = if played.frequency_hz() > expected.frequency_hz() {
            (ErrorKind::PitchTooHigh, "high")
        } else {
            (ErrorKind::PitchTooLow, "low")
        };

        PerformanceError {
            kind,
            time_seconds,
            message: format!(
                "The pitch played is too {}. The correct note was {}, but {} was played.",
                direction, expected, played
            ),
        }
    }

    pub fn note_late(time_seconds: f64) -> Self {
        PerformanceError {
            kind: ErrorKind::NoteLate,
            time_seconds,
            message: "The note was played too late.".to_string(),
        }
    }

    pub fn note_early(time_seconds: f64) -> Self {
        PerformanceError {
            kind: ErrorKind::NoteEarly,
            time_seconds,
            message: "The note was played too early.".to_string(),
        }
    }
}
