// Comparison stage
// Alignment of the two tracks and classification of performance errors

pub mod align;
pub mod classify;

pub use align::{align_tracks, pitch_contour, AlignConfig, WarpingPath};
pub use classify::{ClassifierConfig, ErrorClassifier};

/// Position of a time in beats for a score annotated at `bpm`
pub fn beats_from_start(time_seconds: f64, bpm: f64) -> f64 {
    time_seconds * (bpm / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beats_from_start() {
        assert_eq!(beats_from_start(0.0, 120.0), 0.0);
        assert_eq!(beats_from_start(1.5, 120.0), 3.0);
        assert_eq!(beats_from_start(2.0, 90.0), 3.0);
    }
}
