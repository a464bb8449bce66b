// Audio processing module
// Decoding, framing, pitch tracking and onset detection

pub mod features;
pub mod frames;
pub mod ingest;
pub mod pitch;

pub use features::{detect_onsets, OnsetConfig};
pub use frames::AnalysisConfig;
pub use ingest::{ingest_wav, AudioData, AudioError, Decoder, PcmBuffer, WavDecoder};
pub use pitch::{track_pitch, PitchConfig};
