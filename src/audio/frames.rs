// Analysis framing
// Shared frame grid, windowing and FFT helpers for the pitch and onset stages

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::AnalysisError;

/// Frame grid used by every stage of one comparison.
///
/// Frames are centered: frame `i` covers the samples
/// `[i * hop_size - frame_length / 2, i * hop_size + frame_length / 2)`,
/// zero-padded past either end of the buffer. Both buffers of a comparison
/// are resampled to `sample_rate` first, so frame indices of the reference
/// and the performed track live on the same timebase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rate both buffers are resampled to before analysis
    pub sample_rate: u32,

    /// Samples between consecutive frames
    pub hop_size: usize,

    /// Samples per frame, also the FFT size of the onset spectrogram
    pub frame_length: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            sample_rate: 22050,
            hop_size: 512,
            frame_length: 2048,
        }
    }
}

impl AnalysisConfig {
    /// Number of centered frames for a buffer of `sample_count` samples
    pub fn frame_count(&self, sample_count: usize) -> usize {
        if sample_count == 0 || self.hop_size == 0 {
            return 0;
        }
        1 + sample_count / self.hop_size
    }

    /// Center time of a frame in seconds
    pub fn frame_time(&self, frame_index: usize) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (frame_index * self.hop_size) as f64 / self.sample_rate as f64
    }

    /// Time axis for `frame_count` frames
    pub fn frame_times(&self, frame_count: usize) -> Vec<f64> {
        (0..frame_count).map(|i| self.frame_time(i)).collect()
    }

    /// Frames per second
    pub fn frame_rate(&self) -> f64 {
        if self.hop_size == 0 {
            return 0.0;
        }
        self.sample_rate as f64 / self.hop_size as f64
    }

    /// Convert a duration to a whole number of frames (truncating)
    pub fn seconds_to_frames(&self, seconds: f64) -> usize {
        (seconds * self.frame_rate()).max(0.0) as usize
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.sample_rate == 0 {
            return Err(AnalysisError::InvalidConfig("sample_rate must be positive".to_string()));
        }
        if self.hop_size == 0 {
            return Err(AnalysisError::InvalidConfig("hop_size must be positive".to_string()));
        }
        if self.frame_length < 4 || self.frame_length % 2 != 0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "frame_length must be even and at least 4, got {}",
                self.frame_length
            )));
        }
        Ok(())
    }
}

/// Copy centered frame `index` of `samples` into `out` (length = frame length)
pub fn centered_frame(samples: &[f32], index: usize, hop_size: usize, out: &mut [f32]) {
    let start = (index * hop_size) as isize - (out.len() / 2) as isize;

    for (k, slot) in out.iter_mut().enumerate() {
        let pos = start + k as isize;
        *slot = if pos >= 0 && (pos as usize) < samples.len() {
            samples[pos as usize]
        } else {
            0.0
        };
    }
}

/// Periodic Hann window
pub fn hann_window(length: usize) -> Vec<f32> {
    if length == 0 {
        return Vec::new();
    }

    (0..length)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / length as f32).cos()))
        .collect()
}

/// Magnitude spectra of fixed-size frames, reusing one FFT plan and buffers
pub struct SpectrumAnalyzer {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    output: Vec<Complex<f32>>,
}

impl SpectrumAnalyzer {
    pub fn new(frame_length: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(frame_length);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();

        SpectrumAnalyzer {
            fft,
            window: hann_window(frame_length),
            input,
            output,
        }
    }

    /// Number of frequency bins per spectrum (frame_length / 2 + 1)
    pub fn bin_count(&self) -> usize {
        self.output.len()
    }

    /// Hann-window `frame` and write its magnitude spectrum into `magnitudes`
    pub fn magnitudes(&mut self, frame: &[f32], magnitudes: &mut Vec<f32>) -> Result<(), AnalysisError> {
        for ((slot, &sample), &w) in self.input.iter_mut().zip(frame).zip(&self.window) {
            *slot = sample * w;
        }

        self.fft.process(&mut self.input, &mut self.output)?;

        magnitudes.clear();
        magnitudes.extend(self.output.iter().map(|c| c.norm()));
        Ok(())
    }
}

/// FFT cross-correlation `r[lag] = sum_i a[i] * b[i + lag]`
pub struct Correlator {
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
    size: usize,
    a_buffer: Vec<f32>,
    b_buffer: Vec<f32>,
    a_spectrum: Vec<Complex<f32>>,
    b_spectrum: Vec<Complex<f32>>,
    result: Vec<f32>,
}

impl Correlator {
    /// Plan for correlating an `a_len`-sample template against a `b_len`-sample signal
    pub fn new(a_len: usize, b_len: usize) -> Self {
        // Padding to a_len + b_len keeps the circular correlation free of wrap-around
        let size = (a_len + b_len).max(2).next_power_of_two();
        let mut planner = RealFftPlanner::<f32>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);

        Correlator {
            a_buffer: forward.make_input_vec(),
            b_buffer: forward.make_input_vec(),
            a_spectrum: forward.make_output_vec(),
            b_spectrum: forward.make_output_vec(),
            result: inverse.make_output_vec(),
            forward,
            inverse,
            size,
        }
    }

    /// Write `r[0..out.len()]` into `out`
    pub fn correlate(&mut self, a: &[f32], b: &[f32], out: &mut [f32]) -> Result<(), AnalysisError> {
        load_padded(&mut self.a_buffer, a);
        load_padded(&mut self.b_buffer, b);

        self.forward.process(&mut self.a_buffer, &mut self.a_spectrum)?;
        self.forward.process(&mut self.b_buffer, &mut self.b_spectrum)?;

        for (a_bin, b_bin) in self.a_spectrum.iter_mut().zip(&self.b_spectrum) {
            *a_bin = a_bin.conj() * *b_bin;
        }

        // Real signals: DC and Nyquist bins must be purely real for the inverse
        if let Some(first) = self.a_spectrum.first_mut() {
            first.im = 0.0;
        }
        if let Some(last) = self.a_spectrum.last_mut() {
            last.im = 0.0;
        }

        self.inverse.process(&mut self.a_spectrum, &mut self.result)?;

        let scale = 1.0 / self.size as f32;
        for (slot, &value) in out.iter_mut().zip(&self.result) {
            *slot = value * scale;
        }
        Ok(())
    }
}

fn load_padded(buffer: &mut [f32], data: &[f32]) {
    let copy_len = data.len().min(buffer.len());
    buffer[..copy_len].copy_from_slice(&data[..copy_len]);
    buffer[copy_len..].fill(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_and_times() {
        let config = AnalysisConfig::default();
        assert_eq!(config.frame_count(0), 0);
        assert_eq!(config.frame_count(1), 1);
        assert_eq!(config.frame_count(1024), 3);

        let times = config.frame_times(3);
        assert_eq!(times[0], 0.0);
        assert!((times[2] - 1024.0 / 22050.0).abs() < 1e-12);
    }

    #[test]
    fn test_frame_time_is_frame_center() {
        let config = AnalysisConfig {
            sample_rate: 10,
            hop_size: 2,
            frame_length: 4,
        };
        let samples: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let mut frame = vec![0.0; 4];

        centered_frame(&samples, 3, config.hop_size, &mut frame);

        // Middle sample of frame 3 is sample 6, at 0.6 s
        assert_eq!(frame, vec![4.0, 5.0, 6.0, 7.0]);
        assert!((config.frame_time(3) - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_centered_frame_zero_pads_edges() {
        let samples = vec![1.0; 8];
        let mut frame = vec![9.0; 4];

        centered_frame(&samples, 0, 2, &mut frame);
        assert_eq!(frame, vec![0.0, 0.0, 1.0, 1.0]);

        centered_frame(&samples, 4, 2, &mut frame);
        assert_eq!(frame, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_hann_window() {
        let window = hann_window(100);

        assert!(window[0] < 0.1);
        assert!(window[99] < 0.1);
        assert!(window[50] > 0.9);
    }

    #[test]
    fn test_correlator_matches_direct_sum() {
        let a = [1.0, 2.0, -1.0];
        let b = [0.5, 1.0, 0.0, 3.0, -2.0];
        let mut correlator = Correlator::new(a.len(), b.len());
        let mut out = vec![0.0; 3];

        correlator.correlate(&a, &b, &mut out).unwrap();

        for lag in 0..3 {
            let direct: f32 = (0..a.len()).map(|i| a[i] * b[i + lag]).sum();
            assert!((out[lag] - direct).abs() < 1e-4, "lag {}: {} vs {}", lag, out[lag], direct);
        }
    }

    #[test]
    fn test_spectrum_peak_bin() {
        let length = 1024;
        let mut analyzer = SpectrumAnalyzer::new(length);
        let frame: Vec<f32> = (0..length)
            .map(|i| (2.0 * std::f32::consts::PI * 64.0 * i as f32 / length as f32).sin())
            .collect();
        let mut magnitudes = Vec::new();

        analyzer.magnitudes(&frame, &mut magnitudes).unwrap();

        assert_eq!(magnitudes.len(), analyzer.bin_count());
        let peak = magnitudes
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 64);
    }

    #[test]
    fn test_validate_rejects_zero_hop() {
        let config = AnalysisConfig {
            hop_size: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
