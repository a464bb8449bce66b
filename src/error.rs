// Analysis errors
// Terminal failures of the comparison engine; no stage recovers from these

use thiserror::Error;

use crate::events::TrackRole;

/// Errors raised while extracting features or aligning two tracks
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The track has no frame that passed quantization, so there is nothing to align
    #[error("No voiced content in the {track} track")]
    NoVoicedContent { track: TrackRole },

    /// The warping computation cannot cover the reference range
    #[error("Alignment is degenerate: {0}")]
    AlignmentDegenerate(String),

    #[error("Invalid analysis configuration: {0}")]
    InvalidConfig(String),

    #[error("FFT failed: {0}")]
    Spectral(#[from] realfft::FftError),
}
