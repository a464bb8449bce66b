// Audio ingestion module
// Decodes recorded audio into mono PCM and brings it to the analysis sample rate

use hound::{SampleFormat, WavReader};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    /// The container could not be decoded at all
    #[error("Audio could not be decoded: {0}")]
    DecodeUnavailable(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid audio data: {0}")]
    InvalidData(String),
}

/// Mono PCM samples in [-1.0, 1.0] with their sample rate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcmBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        PcmBuffer { samples, sample_rate }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Linearly interpolated copy at `target_rate`; a plain clone when the rates match
    pub fn resampled(&self, target_rate: u32) -> Result<PcmBuffer, AudioError> {
        if self.sample_rate == 0 || target_rate == 0 {
            return Err(AudioError::InvalidData(format!(
                "cannot resample from {} Hz to {} Hz",
                self.sample_rate, target_rate
            )));
        }
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(PcmBuffer::new(self.samples.clone(), target_rate));
        }

        let source = &self.samples;
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (source.len() as u64 * target_rate as u64 / self.sample_rate as u64) as usize;
        let last = source.len() - 1;

        let samples = (0..out_len)
            .map(|i| {
                let position = i as f64 * ratio;
                let index = (position.floor() as usize).min(last);
                let frac = (position - index as f64) as f32;
                let next = source[(index + 1).min(last)];
                source[index] + (next - source[index]) * frac
            })
            .collect();

        Ok(PcmBuffer::new(samples, target_rate))
    }
}

/// Turns an encoded recording into a mono PCM buffer
pub trait Decoder {
    fn decode(&self, data: &[u8]) -> Result<PcmBuffer, AudioError>;
}

/// Decoder for RIFF/WAVE files
#[derive(Debug, Clone, Copy, Default)]
pub struct WavDecoder;

impl Decoder for WavDecoder {
    fn decode(&self, data: &[u8]) -> Result<PcmBuffer, AudioError> {
        let audio = ingest_wav(data)?;
        log::debug!(
            "Decoded WAV: {} Hz, {} channel(s), {}-bit, {:.2}s",
            audio.sample_rate,
            audio.channels,
            audio.bit_depth,
            audio.duration_secs()
        );
        Ok(PcmBuffer::new(audio.to_mono(), audio.sample_rate))
    }
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Interleaved samples normalized to f32 in range [-1.0, 1.0]
    pub samples: Vec<f32>,

    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of the stored samples (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels == 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Read a WAV file from raw bytes, normalizing every supported sample format to f32
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let mut reader = WavReader::new(Cursor::new(data))?;

    let spec = reader.spec();
    if spec.channels == 0 || spec.sample_rate == 0 {
        return Err(AudioError::InvalidData(format!(
            "{} channel(s) at {} Hz",
            spec.channels, spec.sample_rate
        )));
    }

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        // hound hands 8-bit PCM back already centered on zero
        (SampleFormat::Int, 8) => read_scaled::<i8>(&mut reader, 128.0)?,
        (SampleFormat::Int, 16) => read_scaled::<i16>(&mut reader, 32_768.0)?,
        (SampleFormat::Int, 24) => read_scaled::<i32>(&mut reader, 8_388_608.0)?,
        (SampleFormat::Int, 32) => read_scaled::<i32>(&mut reader, 2_147_483_648.0)?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        (format, bits) => {
            return Err(AudioError::UnsupportedFormat(format!("{:?} {}-bit audio", format, bits)));
        }
    };

    let frame_count = samples.len() / spec.channels as usize;

    Ok(AudioData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bit_depth: spec.bits_per_sample,
        frame_count,
    })
}

fn read_scaled<S>(reader: &mut WavReader<Cursor<&[u8]>>, full_scale: f32) -> Result<Vec<f32>, AudioError>
where
    S: hound::Sample + Into<f64>,
{
    reader
        .samples::<S>()
        .map(|s| s.map(|v| (v.into() / full_scale as f64) as f32))
        .collect::<Result<Vec<_>, _>>()
        .map_err(AudioError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(spec: WavSpec, write: impl FnOnce(&mut WavWriter<std::io::BufWriter<std::fs::File>>)) -> Vec<u8> {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut writer = WavWriter::create(file.path(), spec).unwrap();
        write(&mut writer);
        writer.finalize().unwrap();
        std::fs::read(file.path()).unwrap()
    }

    #[test]
    fn test_audio_data_to_mono() {
        let audio_data = AudioData {
            samples: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            sample_rate: 44100,
            channels: 2,
            bit_depth: 16,
            frame_count: 3,
        };

        let mono = audio_data.to_mono();

        assert_eq!(mono.len(), 3);
        assert!((mono[0] - 0.15).abs() < 1e-6);
        assert!((mono[1] - 0.35).abs() < 1e-6);
        assert!((mono[2] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_decode_stereo_16_bit() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = write_wav(spec, |w| {
            for _ in 0..100 {
                w.write_sample(16_384i16).unwrap();
                w.write_sample(0i16).unwrap();
            }
        });

        let pcm = WavDecoder.decode(&bytes).unwrap();

        assert_eq!(pcm.sample_rate, 44100);
        assert_eq!(pcm.samples.len(), 100);
        assert!(pcm.samples.iter().all(|&s| (s - 0.25).abs() < 1e-4));
    }

    #[test]
    fn test_decode_float() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let bytes = write_wav(spec, |w| {
            for s in [0.5f32, -0.5, 0.25] {
                w.write_sample(s).unwrap();
            }
        });

        let pcm = WavDecoder.decode(&bytes).unwrap();
        assert_eq!(pcm.samples, vec![0.5, -0.5, 0.25]);
    }

    #[test]
    fn test_garbage_is_decode_unavailable() {
        let result = WavDecoder.decode(b"definitely not a wave file");
        assert!(matches!(result, Err(AudioError::DecodeUnavailable(_))));
    }

    #[test]
    fn test_resample_halves_length() {
        let pcm = PcmBuffer::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0], 44100);

        let resampled = pcm.resampled(22050).unwrap();

        assert_eq!(resampled.sample_rate, 22050);
        assert_eq!(resampled.samples, vec![0.0, 2.0, 4.0, 6.0]);
    }

    #[test]
    fn test_resample_interpolates() {
        let pcm = PcmBuffer::new(vec![0.0, 1.0, 2.0], 10);

        let resampled = pcm.resampled(20).unwrap();

        assert_eq!(resampled.samples.len(), 6);
        assert!((resampled.samples[1] - 0.5).abs() < 1e-6);
        assert!((resampled.samples[3] - 1.5).abs() < 1e-6);
        // Past the last sample the value holds
        assert!((resampled.samples[5] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_same_rate_and_zero_rate() {
        let pcm = PcmBuffer::new(vec![0.1, 0.2], 22050);
        assert_eq!(pcm.resampled(22050).unwrap(), pcm);
        assert!(PcmBuffer::new(vec![0.1], 0).resampled(22050).is_err());
        assert_eq!(pcm.duration_secs(), 2.0 / 22050.0);
    }
}
