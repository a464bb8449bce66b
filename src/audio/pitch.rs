// Pitch tracking
// YIN fundamental-frequency estimation with a per-frame voicing confidence

use serde::{Deserialize, Serialize};

use crate::audio::frames::{centered_frame, AnalysisConfig, Correlator};
use crate::error::AnalysisError;
use crate::events::PitchFrame;

/// Configuration for pitch tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Lowest fundamental searched (C2 by default)
    /// Bounding the band keeps the tracker from jumping octaves
    pub min_frequency_hz: f32,

    /// Highest fundamental searched (C7 by default)
    pub max_frequency_hz: f32,

    /// YIN absolute threshold on the normalized difference function
    pub threshold: f32,

    /// Frames with RMS below this are reported as silent
    pub silence_rms: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        PitchConfig {
            min_frequency_hz: 65.406_39,
            max_frequency_hz: 2093.004_5,
            threshold: 0.1,
            silence_rms: 1e-3,
        }
    }
}

impl PitchConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.min_frequency_hz > 0.0 && self.min_frequency_hz < self.max_frequency_hz) {
            return Err(AnalysisError::InvalidConfig(format!(
                "pitch band {}..{} Hz is empty",
                self.min_frequency_hz, self.max_frequency_hz
            )));
        }
        Ok(())
    }
}

/// Lag search range and integration window derived from the band
struct LagRange {
    min_tau: usize,
    max_tau: usize,
    window: usize,
}

impl LagRange {
    fn new(analysis: &AnalysisConfig, config: &PitchConfig) -> Result<Self, AnalysisError> {
        let sample_rate = analysis.sample_rate as f32;
        let frame_length = analysis.frame_length;

        let max_tau = ((sample_rate / config.min_frequency_hz).ceil() as usize).min(frame_length / 2);
        let min_tau = ((sample_rate / config.max_frequency_hz).floor() as usize).max(2);

        if min_tau + 1 >= max_tau {
            return Err(AnalysisError::InvalidConfig(format!(
                "frame length {} cannot resolve the pitch band at {} Hz",
                frame_length, analysis.sample_rate
            )));
        }

        Ok(LagRange {
            min_tau,
            max_tau,
            window: frame_length - max_tau,
        })
    }
}

/// Track pitch over the whole buffer, one PitchFrame per analysis frame
pub fn track_pitch(
    samples: &[f32],
    analysis: &AnalysisConfig,
    config: &PitchConfig,
) -> Result<Vec<PitchFrame>, AnalysisError> {
    let frame_count = analysis.frame_count(samples.len());
    if frame_count == 0 {
        return Ok(Vec::new());
    }

    let lags = LagRange::new(analysis, config)?;
    let mut correlator = Correlator::new(lags.window, analysis.frame_length);

    let mut frame = vec![0.0f32; analysis.frame_length];
    let mut correlation = vec![0.0f32; lags.max_tau + 1];
    let mut cmnd = vec![1.0f32; lags.max_tau + 1];
    let mut energy_prefix = vec![0.0f32; analysis.frame_length + 1];

    let mut frames = Vec::with_capacity(frame_count);
    let mut voiced = 0;

    for index in 0..frame_count {
        centered_frame(samples, index, analysis.hop_size, &mut frame);

        let (frequency_hz, voicing_confidence) = if rms(&frame) < config.silence_rms {
            (None, 0.0)
        } else {
            correlator.correlate(&frame[..lags.window], &frame, &mut correlation)?;
            normalized_difference(&frame, &correlation, &lags, &mut energy_prefix, &mut cmnd);
            estimate_period(&cmnd, &lags, config, analysis.sample_rate as f32)
        };

        if voicing_confidence > 0.5 {
            voiced += 1;
        }

        frames.push(PitchFrame {
            frame_index: index,
            time_seconds: analysis.frame_time(index),
            frequency_hz,
            voicing_confidence,
        });
    }

    log::debug!("Pitch tracked {} frames ({} confidently voiced)", frames.len(), voiced);

    Ok(frames)
}

fn rms(frame: &[f32]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
}

/// YIN cumulative mean normalized difference, written into `cmnd[0..=max_tau]`
fn normalized_difference(
    frame: &[f32],
    correlation: &[f32],
    lags: &LagRange,
    energy_prefix: &mut [f32],
    cmnd: &mut [f32],
) {
    energy_prefix[0] = 0.0;
    for (i, &sample) in frame.iter().enumerate() {
        energy_prefix[i + 1] = energy_prefix[i] + sample * sample;
    }
    let energy = |start: usize| energy_prefix[start + lags.window] - energy_prefix[start];

    let base_energy = energy(0);
    let mut running_sum = 0.0f32;
    cmnd[0] = 1.0;

    for tau in 1..=lags.max_tau {
        let difference = (base_energy + energy(tau) - 2.0 * correlation[tau]).max(0.0);
        running_sum += difference;
        cmnd[tau] = if running_sum > f32::EPSILON {
            difference * tau as f32 / running_sum
        } else {
            1.0
        };
    }
}

/// Pick the period from the normalized difference and convert it to Hz.
/// Returns (frequency, voicing confidence).
fn estimate_period(
    cmnd: &[f32],
    lags: &LagRange,
    config: &PitchConfig,
    sample_rate: f32,
) -> (Option<f32>, f32) {
    let Some(tau) = first_dip(cmnd, lags, config.threshold) else {
        return (None, 0.0);
    };

    let confidence = (1.0 - cmnd[tau]).clamp(0.0, 1.0);
    let refined = parabolic_peak(cmnd, tau);
    if refined <= 0.0 {
        return (None, confidence);
    }

    let frequency = sample_rate / refined;
    let in_band = frequency >= config.min_frequency_hz && frequency <= config.max_frequency_hz;

    (in_band.then_some(frequency), confidence)
}

/// First local minimum under the threshold, else the global minimum
fn first_dip(cmnd: &[f32], lags: &LagRange, threshold: f32) -> Option<usize> {
    let mut tau = lags.min_tau;
    while tau <= lags.max_tau {
        if cmnd[tau] < threshold {
            while tau < lags.max_tau && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            return Some(tau);
        }
        tau += 1;
    }

    (lags.min_tau..=lags.max_tau).min_by(|&a, &b| cmnd[a].total_cmp(&cmnd[b]))
}

/// Sub-sample refinement of a minimum at `tau`
fn parabolic_peak(values: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= values.len() {
        return tau as f32;
    }

    let (a, b, c) = (values[tau - 1], values[tau], values[tau + 1]);
    let denominator = a - 2.0 * b + c;
    if denominator.abs() < 1e-8 {
        return tau as f32;
    }

    tau as f32 + (a - c) / (2.0 * denominator)
}
