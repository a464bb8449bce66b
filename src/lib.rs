// Rehearsal - performance comparison engine
// Module declarations

pub mod audio;
pub mod commands;
pub mod compare;
pub mod error;
pub mod events;
pub mod pipeline;

pub use compare::beats_from_start;
pub use error::AnalysisError;
pub use events::{ErrorKind, Note, NoteEvent, PerformanceError};
pub use pipeline::{Comparator, Comparison, CompareError, EngineConfig, TrackAnalysis};
