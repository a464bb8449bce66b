// Sequence alignment
// Dynamic time warping between the reference and performed pitch contours

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::events::{QuantizedTrack, TrackRole};

/// Settings for the warping computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignConfig {
    /// Added to the accumulated cost of an in-sync (diagonal) step
    pub diagonal_weight: f64,

    /// Added to the accumulated cost of an insertion or deletion step
    /// Keep above `diagonal_weight` so gradual drift beats spurious gaps
    pub axis_weight: f64,

    /// Let the reference match any stretch of the performance. When off,
    /// the first and last frames of both tracks are paired, silent edges
    /// included.
    pub subsequence: bool,
}

impl Default for AlignConfig {
    fn default() -> Self {
        AlignConfig {
            diagonal_weight: 0.0,
            axis_weight: 0.1,
            subsequence: true,
        }
    }
}

/// Monotonic frame correspondence between reference and performed tracks.
///
/// Pairs are `(reference_frame, performed_frame)`, ordered by reference
/// frame then performed frame, and every reference frame appears at least once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarpingPath {
    pairs: Vec<(usize, usize)>,
}

impl WarpingPath {
    /// Wrap pairs that are already ordered and monotonic
    pub fn from_pairs(pairs: Vec<(usize, usize)>) -> Result<Self, AnalysisError> {
        let path = WarpingPath { pairs };
        if !path.is_monotonic() {
            return Err(AnalysisError::AlignmentDegenerate(
                "warping path is not monotonic".to_string(),
            ));
        }
        Ok(path)
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// First performed frame paired with `reference_frame`
    pub fn performed_for(&self, reference_frame: usize) -> Option<usize> {
        let start = self.pairs.partition_point(|&(r, _)| r < reference_frame);
        self.pairs
            .get(start)
            .filter(|&&(r, _)| r == reference_frame)
            .map(|&(_, p)| p)
    }

    /// Both coordinates non-decreasing between consecutive pairs
    pub fn is_monotonic(&self) -> bool {
        self.pairs
            .windows(2)
            .all(|w| w[0].0 <= w[1].0 && w[0].1 <= w[1].1)
    }
}

/// Predecessor chosen for a cell of the accumulated cost matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Step {
    Start,
    Diagonal,
    Reference,
    Performed,
}

/// Align two quantized tracks
pub fn align_tracks(
    reference: &QuantizedTrack,
    performed: &QuantizedTrack,
    config: &AlignConfig,
) -> Result<WarpingPath, AnalysisError> {
    if reference.is_empty() {
        return Err(AnalysisError::AlignmentDegenerate("reference track is empty".to_string()));
    }
    if performed.is_empty() {
        return Err(AnalysisError::AlignmentDegenerate("performed track is empty".to_string()));
    }

    let x = pitch_contour(reference).ok_or(AnalysisError::NoVoicedContent {
        track: TrackRole::Reference,
    })?;
    let y = pitch_contour(performed).ok_or(AnalysisError::NoVoicedContent {
        track: TrackRole::Performed,
    })?;

    let path = warp(&x, &y, config);
    log::debug!(
        "Aligned {} reference frames to {} performed frames ({} path steps)",
        x.len(),
        y.len(),
        path.len()
    );

    Ok(path)
}

/// Track as MIDI note numbers with gaps linearly interpolated.
/// Frames before the first or after the last defined note hold the nearest
/// defined value. None when the track has no defined note at all.
pub fn pitch_contour(track: &QuantizedTrack) -> Option<Vec<f64>> {
    let known: Vec<(usize, f64)> = track
        .frames
        .iter()
        .enumerate()
        .filter_map(|(i, f)| f.note.map(|n| (i, n.midi() as f64)))
        .collect();

    let (&(first_index, first_value), &(last_index, last_value)) = (known.first()?, known.last()?);

    let mut contour = vec![0.0; track.len()];
    contour[..=first_index].fill(first_value);
    contour[last_index..].fill(last_value);

    for pair in known.windows(2) {
        let (start, start_value) = pair[0];
        let (end, end_value) = pair[1];
        let span = (end - start) as f64;
        for (offset, slot) in contour[start..=end].iter_mut().enumerate() {
            *slot = start_value + (end_value - start_value) * offset as f64 / span;
        }
    }

    Some(contour)
}

/// DTW over two non-empty contours.
/// Keeps two accumulated-cost rows plus a one-byte step per cell for the backtrace.
fn warp(x: &[f64], y: &[f64], config: &AlignConfig) -> WarpingPath {
    let (n, m) = (x.len(), y.len());
    let mut previous = vec![f64::INFINITY; m];
    let mut current = vec![0.0f64; m];
    let mut steps = vec![Step::Start; n * m];
    let at = |i: usize, j: usize| i * m + j;

    for i in 0..n {
        for j in 0..m {
            let local = (x[i] - y[j]).abs();

            let (best, step) = if i == 0 && (j == 0 || config.subsequence) {
                (0.0, Step::Start)
            } else {
                // Ties keep the earlier candidate: diagonal, then reference-only, then performed-only
                let mut best = (f64::INFINITY, Step::Start);
                if i > 0 && j > 0 {
                    best = (previous[j - 1] + config.diagonal_weight, Step::Diagonal);
                }
                if i > 0 {
                    let candidate = previous[j] + config.axis_weight;
                    if candidate < best.0 {
                        best = (candidate, Step::Reference);
                    }
                }
                if j > 0 {
                    let candidate = current[j - 1] + config.axis_weight;
                    if candidate < best.0 {
                        best = (candidate, Step::Performed);
                    }
                }
                best
            };

            current[j] = local + best;
            steps[at(i, j)] = step;
        }
        std::mem::swap(&mut previous, &mut current);
    }

    // After the final swap `previous` holds the last row
    let last_row = n - 1;
    let end = if config.subsequence {
        (0..m)
            .min_by(|&a, &b| previous[a].total_cmp(&previous[b]))
            .unwrap_or(m - 1)
    } else {
        m - 1
    };

    let mut pairs = Vec::with_capacity(n + m);
    let (mut i, mut j) = (last_row, end);
    loop {
        pairs.push((i, j));
        match steps[at(i, j)] {
            Step::Start => break,
            Step::Diagonal => {
                i -= 1;
                j -= 1;
            }
            Step::Reference => i -= 1,
            Step::Performed => j -= 1,
        }
    }
    pairs.reverse();

    WarpingPath { pairs }
}
