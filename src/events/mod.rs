// Note event module
// Note types, pitch quantization, and onset-to-note resolution

pub mod quantize;
pub mod resolver;
pub mod types;

pub use quantize::{quantize_frame, quantize_track, QuantizerConfig};
pub use resolver::{resolve_onsets, ResolverConfig};
pub use types::{
    ErrorKind, Note, NoteEvent, OnsetCandidate, PerformanceError, PitchFrame, QuantizedFrame,
    QuantizedTrack, TrackRole,
};
