// Spectral novelty and onset detection
// Mel spectrogram, max-filtered spectral flux, and adaptive peak picking

use serde::{Deserialize, Serialize};

use crate::audio::frames::{centered_frame, AnalysisConfig, SpectrumAnalyzer};
use crate::error::AnalysisError;
use crate::events::OnsetCandidate;

/// Configuration for onset detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OnsetConfig {
    /// Number of mel bands in the onset spectrogram
    pub mel_bands: usize,

    /// Lowest mel bands flattened to the floor (DC and rumble)
    pub suppressed_low_bands: usize,

    /// Width in bands of the frequency max-filter applied to the reference spectrum
    pub max_filter_bands: usize,

    /// Frame lag of the spectral difference
    pub lag: usize,

    /// Dynamic range of the log spectrogram in dB
    pub top_db: f32,

    /// Peak must be the maximum over this much time before it
    pub pre_max_secs: f64,

    /// ... and this much after it
    pub post_max_secs: f64,

    /// Mean used for the adaptive threshold starts this far before the peak
    pub pre_avg_secs: f64,

    /// ... and ends this far after it
    pub post_avg_secs: f64,

    /// Amount the normalized novelty must exceed the local mean by
    pub delta: f32,

    /// Minimum time between onsets
    pub wait_secs: f64,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            mel_bands: 128,
            suppressed_low_bands: 10,
            max_filter_bands: 5,
            lag: 1,
            top_db: 80.0,
            pre_max_secs: 0.03,
            post_max_secs: 0.0,
            pre_avg_secs: 0.10,
            post_avg_secs: 0.10,
            delta: 0.07,
            wait_secs: 0.03,
        }
    }
}

impl OnsetConfig {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.lag == 0 {
            return Err(AnalysisError::InvalidConfig("onset lag must be at least 1".to_string()));
        }
        if self.max_filter_bands == 0 {
            return Err(AnalysisError::InvalidConfig(
                "onset max filter must span at least one band".to_string(),
            ));
        }
        if self.mel_bands <= self.suppressed_low_bands {
            return Err(AnalysisError::InvalidConfig(format!(
                "{} mel bands leave nothing above the {} suppressed ones",
                self.mel_bands, self.suppressed_low_bands
            )));
        }
        Ok(())
    }
}

/// Peak-picking windows converted to frames
struct PeakWindows {
    pre_max: usize,
    post_max: usize,
    pre_avg: usize,
    post_avg: usize,
    wait: usize,
}

impl PeakWindows {
    fn new(analysis: &AnalysisConfig, config: &OnsetConfig) -> Self {
        PeakWindows {
            pre_max: analysis.seconds_to_frames(config.pre_max_secs),
            post_max: analysis.seconds_to_frames(config.post_max_secs) + 1,
            pre_avg: analysis.seconds_to_frames(config.pre_avg_secs),
            post_avg: analysis.seconds_to_frames(config.post_avg_secs) + 1,
            wait: analysis.seconds_to_frames(config.wait_secs),
        }
    }
}

/// Detect onsets in a mono buffer.
/// Returned frame indices are strictly increasing.
pub fn detect_onsets(
    samples: &[f32],
    analysis: &AnalysisConfig,
    config: &OnsetConfig,
) -> Result<Vec<OnsetCandidate>, AnalysisError> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let spectrogram = log_spectrogram(samples, analysis, config)?;
    let novelty = spectral_novelty(&spectrogram, analysis, config);
    let onsets = pick_onset_peaks(&novelty, &PeakWindows::new(analysis, config), config.delta);

    log::debug!(
        "Detected {} onset candidates over {} frames",
        onsets.len(),
        novelty.len()
    );

    Ok(onsets)
}

/// Triangular mel filters (Slaney scale, area-normalized) over an FFT's bins
struct MelFilterbank {
    /// Per band: first bin with a nonzero weight and the weights from there on
    bands: Vec<(usize, Vec<f32>)>,
}

impl MelFilterbank {
    fn new(band_count: usize, frame_length: usize, sample_rate: u32) -> Self {
        let bin_count = frame_length / 2 + 1;
        let bin_hz = sample_rate as f64 / frame_length as f64;

        let top = hz_to_mel(sample_rate as f64 / 2.0);
        let edges: Vec<f64> = (0..band_count + 2)
            .map(|i| mel_to_hz(top * i as f64 / (band_count + 1) as f64))
            .collect();

        let bands: Vec<(usize, Vec<f32>)> = edges
            .windows(3)
            .map(|edge| {
                let (low, center, high) = (edge[0], edge[1], edge[2]);
                let area = 2.0 / (high - low);
                let weights: Vec<(usize, f32)> = (0..bin_count)
                    .filter_map(|bin| {
                        let hz = bin as f64 * bin_hz;
                        let rising = (hz - low) / (center - low);
                        let falling = (high - hz) / (high - center);
                        let weight = rising.min(falling).max(0.0) * area;
                        (weight > 0.0).then_some((bin, weight as f32))
                    })
                    .collect();
                let start = weights.first().map_or(0, |&(bin, _)| bin);
                (start, weights.into_iter().map(|(_, w)| w).collect())
            })
            .collect();

        MelFilterbank { bands }
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// Project a power spectrum onto the mel bands
    fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.bands
            .iter()
            .map(|(start, weights)| {
                power
                    .iter()
                    .skip(*start)
                    .zip(weights)
                    .map(|(p, w)| p * w)
                    .sum::<f32>()
            })
            .collect()
    }
}

fn hz_to_mel(hz: f64) -> f64 {
    const LINEAR_HZ_PER_MEL: f64 = 200.0 / 3.0;
    const BREAK_HZ: f64 = 1000.0;

    if hz < BREAK_HZ {
        hz / LINEAR_HZ_PER_MEL
    } else {
        BREAK_HZ / LINEAR_HZ_PER_MEL + (hz / BREAK_HZ).ln() / log_step()
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    const LINEAR_HZ_PER_MEL: f64 = 200.0 / 3.0;
    const BREAK_MEL: f64 = 15.0;

    if mel < BREAK_MEL {
        mel * LINEAR_HZ_PER_MEL
    } else {
        1000.0 * (log_step() * (mel - BREAK_MEL)).exp()
    }
}

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Onset spectrogram plus the total power of each frame
struct OnsetSpectrogram {
    bands: Vec<Vec<f32>>,
    energy: Vec<f32>,
}

/// Mel power spectra in dB relative to the loudest band, floored at
/// `-top_db`, with the lowest bands pinned to the floor.
///
/// Band power goes through the amplitude formula (20 log10), so `top_db`
/// spans half as many decibels of actual power.
fn log_spectrogram(
    samples: &[f32],
    analysis: &AnalysisConfig,
    config: &OnsetConfig,
) -> Result<OnsetSpectrogram, AnalysisError> {
    const AMIN: f32 = 1e-5;

    let frame_count = analysis.frame_count(samples.len());
    let mut analyzer = SpectrumAnalyzer::new(analysis.frame_length);
    let filterbank = MelFilterbank::new(config.mel_bands, analysis.frame_length, analysis.sample_rate);
    let mut frame = vec![0.0f32; analysis.frame_length];
    let mut magnitudes = Vec::with_capacity(analyzer.bin_count());
    let mut bands = Vec::with_capacity(frame_count);
    let mut energy = Vec::with_capacity(frame_count);
    let mut peak = AMIN;

    for index in 0..frame_count {
        centered_frame(samples, index, analysis.hop_size, &mut frame);
        analyzer.magnitudes(&frame, &mut magnitudes)?;

        let power: Vec<f32> = magnitudes.iter().map(|m| m * m).collect();
        energy.push(power.iter().sum::<f32>());

        let mut mel = filterbank.apply(&power);
        for value in mel.iter_mut() {
            peak = peak.max(*value);
            *value = 20.0 * value.max(AMIN).log10();
        }
        bands.push(mel);
    }

    let reference_db = 20.0 * peak.log10();
    let floor = -config.top_db;
    let suppressed = config.suppressed_low_bands.min(filterbank.band_count());

    for spectrum in bands.iter_mut() {
        for (band, db) in spectrum.iter_mut().enumerate() {
            *db = if band < suppressed {
                floor
            } else {
                (*db - reference_db).max(floor)
            };
        }
    }

    Ok(OnsetSpectrogram { bands, energy })
}

/// Onset strength per frame.
///
/// Each band is compared against the previous frame's spectrum after a max
/// filter across neighbouring bands (so vibrato does not register as a new
/// partial); positive differences are aggregated with `max` across bands.
/// Frames whose total power does not rise score zero, so note releases
/// never register.
/// The curve is delayed by `lag + frame_length / (2 * hop)` frames so peaks
/// line up with the centered pitch frames.
fn spectral_novelty(spectrogram: &OnsetSpectrogram, analysis: &AnalysisConfig, config: &OnsetConfig) -> Vec<f32> {
    let bands = &spectrogram.bands;
    let frame_count = bands.len();
    let mut novelty = vec![0.0f32; frame_count];
    if frame_count <= config.lag {
        return novelty;
    }

    let reference: Vec<Vec<f32>> = bands
        .iter()
        .map(|spectrum| max_filter(spectrum, config.max_filter_bands))
        .collect();

    let delay = config.lag + analysis.frame_length / (2 * analysis.hop_size);

    for t in config.lag..frame_count {
        if spectrogram.energy[t] <= spectrogram.energy[t - config.lag] {
            continue;
        }

        let strength = bands[t]
            .iter()
            .zip(&reference[t - config.lag])
            .map(|(current, previous)| (current - previous).max(0.0))
            .fold(0.0f32, f32::max);

        let target = t - config.lag + delay;
        if target < frame_count {
            novelty[target] = strength;
        }
    }

    novelty
}

/// Centered running maximum over `size` bins, clipped at the edges
fn max_filter(values: &[f32], size: usize) -> Vec<f32> {
    let before = size / 2;
    let after = size - 1 - before;

    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(values.len());
            values[start..end].iter().copied().fold(f32::NEG_INFINITY, f32::max)
        })
        .collect()
}

/// Pick onset peaks from the novelty curve using a local-mean threshold
fn pick_onset_peaks(novelty: &[f32], windows: &PeakWindows, delta: f32) -> Vec<OnsetCandidate> {
    if novelty.is_empty() {
        return Vec::new();
    }

    let min = novelty.iter().copied().fold(f32::INFINITY, f32::min);
    let max = novelty.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    // A flat curve has no attacks
    if range <= f32::EPSILON {
        return Vec::new();
    }

    let normalized: Vec<f32> = novelty.iter().map(|v| (v - min) / range).collect();
    let len = normalized.len();

    let mut onsets = Vec::new();
    let mut last_onset: Option<usize> = None;

    for n in 0..len {
        let max_start = n.saturating_sub(windows.pre_max);
        let max_end = (n + windows.post_max).min(len);
        let local_max = normalized[max_start..max_end]
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max);
        if normalized[n] < local_max {
            continue;
        }

        let avg_start = n.saturating_sub(windows.pre_avg);
        let avg_end = (n + windows.post_avg).min(len);
        let local_mean =
            normalized[avg_start..avg_end].iter().sum::<f32>() / (avg_end - avg_start) as f32;
        if normalized[n] < local_mean + delta {
            continue;
        }

        if let Some(last) = last_onset {
            if n <= last + windows.wait {
                continue;
            }
        }

        onsets.push(OnsetCandidate { frame_index: n });
        last_onset = Some(n);
    }

    onsets
}
