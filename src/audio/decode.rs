//! # WAV Decoding
//!
//! Reads a WAV artifact from disk and converts it to 16kHz mono f32 PCM.
//!
//! ## Conversion Steps:
//! 1. Parse the RIFF/WAVE container and pull out the sample data
//! 2. Normalize whatever bit depth the file carries to f32 in [-1.0, 1.0]
//! 3. Mix interleaved channels down to mono by averaging
//! 4. Linearly resample to 16kHz if the source rate differs
//!
//! Failures here (truncated container, unsupported codec) surface as
//! transcription failures — by this point the payload already passed the
//! sniff gate, so a broken file is the model capability's problem domain.

use std::fs::File;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// Sample rate the Whisper model expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode a WAV file into 16kHz mono f32 samples.
pub fn decode_wav_file(path: &Path) -> Result<Vec<f32>> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open audio file {}", path.display()))?;

    let (header, data) = wav::read(&mut file)
        .map_err(|e| anyhow!("failed to parse WAV container: {}", e))?;

    let interleaved = to_float_samples(data)?;
    if interleaved.is_empty() {
        return Err(anyhow!("audio file contains no samples"));
    }

    let channels = header.channel_count.max(1) as usize;
    let mono = mix_to_mono(&interleaved, channels);

    if header.sampling_rate == TARGET_SAMPLE_RATE {
        Ok(mono)
    } else {
        Ok(resample(&mono, header.sampling_rate, TARGET_SAMPLE_RATE))
    }
}

/// Normalize any supported bit depth to f32 in [-1.0, 1.0].
fn to_float_samples(data: wav::BitDepth) -> Result<Vec<f32>> {
    let samples = match data {
        // 8-bit WAV is unsigned with a 128 midpoint.
        wav::BitDepth::Eight(samples) => samples
            .into_iter()
            .map(|s| (s as f32 - 128.0) / 128.0)
            .collect(),
        wav::BitDepth::Sixteen(samples) => samples
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
        wav::BitDepth::TwentyFour(samples) => samples
            .into_iter()
            .map(|s| s as f32 / 8_388_608.0)
            .collect(),
        wav::BitDepth::ThirtyTwoFloat(samples) => samples,
        wav::BitDepth::Empty => Vec::new(),
    };
    Ok(samples)
}

/// Average interleaved channels down to a single channel.
fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Adequate for speech at transcription quality; the model's mel frontend
/// discards most of what a windowed-sinc resampler would preserve.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        output.push(a + (b - a) * frac);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generate a minimal valid WAV file (16-bit PCM) for testing.
    fn generate_test_wav(sample_rate: u32, channels: u16, num_frames: u32) -> Vec<u8> {
        let bits_per_sample: u16 = 16;
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let block_align = channels * bits_per_sample / 8;
        let data_size = num_frames * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let file_size = 36 + data_size;

        let mut buf = Vec::with_capacity(file_size as usize + 8);
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for i in 0..(num_frames * u32::from(channels)) {
            let sample = ((i as f32 * 0.05).sin() * 10000.0) as i16;
            buf.extend_from_slice(&sample.to_le_bytes());
        }
        buf
    }

    fn write_temp_wav(bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("decode_test_{}.wav", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_decode_16khz_mono_wav() {
        let path = write_temp_wav(&generate_test_wav(16000, 1, 1600));
        let samples = decode_wav_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().all(|&s| (-1.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_decode_stereo_mixes_to_mono() {
        let path = write_temp_wav(&generate_test_wav(16000, 2, 800));
        let samples = decode_wav_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(samples.len(), 800);
    }

    #[test]
    fn test_decode_44khz_resamples_to_16khz() {
        let path = write_temp_wav(&generate_test_wav(44100, 1, 44100));
        let samples = decode_wav_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        // One second of audio should come back as roughly 16000 samples.
        let ratio = samples.len() as f64 / 16000.0;
        assert!((ratio - 1.0).abs() < 0.05, "ratio: {}", ratio);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let path = write_temp_wav(b"definitely not a wav file");
        let result = decode_wav_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_file_fails() {
        let path = std::env::temp_dir().join("does_not_exist_ever.wav");
        assert!(decode_wav_file(&path).is_err());
    }

    #[test]
    fn test_resample_downsample_ratio() {
        let samples: Vec<f32> = (0..48000).map(|i| (i as f32 / 48000.0).sin()).collect();
        let result = resample(&samples, 48000, 16000);
        let ratio = result.len() as f64 / samples.len() as f64;
        assert!((ratio - 1.0 / 3.0).abs() < 0.01, "ratio: {}", ratio);
    }
}
