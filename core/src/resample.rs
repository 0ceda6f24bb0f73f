//! Audio channel and sample-rate utilities for capture and file input

use crate::error::{Result, TonemarkError};

fn check_interleaved(samples: &[f32], channels: usize) -> Result<()> {
    if channels == 0 || samples.len() % channels != 0 {
        return Err(TonemarkError::InvalidInput(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }
    Ok(())
}

/// Average interleaved channels into mono
pub fn downmix(samples: &[f32], channels: usize) -> Result<Vec<f32>> {
    check_interleaved(samples, channels)?;
    if channels == 1 {
        return Ok(samples.to_vec());
    }
    Ok(samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Pick one channel out of an interleaved buffer
///
/// The encoder marks channel 0 only; decoding that channel avoids the 6 dB
/// loss a downmix costs against an unmarked second channel.
pub fn extract_channel(samples: &[f32], channels: usize, channel: usize) -> Result<Vec<f32>> {
    check_interleaved(samples, channels)?;
    if channel >= channels {
        return Err(TonemarkError::InvalidInput(format!(
            "channel {} requested from {}-channel audio",
            channel, channels
        )));
    }
    Ok(samples.iter().skip(channel).step_by(channels).copied().collect())
}

/// Resample to a target rate using linear interpolation
pub fn resample_audio(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let new_length = ((samples.len() as u64 * to_rate as u64).div_ceil(from_rate as u64)) as usize;
    let mut resampled = Vec::with_capacity(new_length);

    for i in 0..new_length {
        let src_idx = i as f64 / ratio;
        let lo = src_idx.floor() as usize;
        let fraction = (src_idx - lo as f64) as f32;

        let value = match (samples.get(lo), samples.get(lo + 1)) {
            (Some(&a), Some(&b)) => a * (1.0 - fraction) + b * fraction,
            (Some(&a), None) => a,
            _ => samples[samples.len() - 1],
        };
        resampled.push(value);
    }

    resampled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let stereo = vec![0.2, 0.8, 0.4, 0.6];
        let mono = downmix(&stereo, 2).unwrap();
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.5).abs() < 0.001);
        assert!((mono[1] - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_downmix_rejects_ragged_input() {
        assert!(downmix(&[0.1, 0.2, 0.3], 2).is_err());
        assert!(downmix(&[0.1], 0).is_err());
    }

    #[test]
    fn test_extract_channel() {
        let interleaved = vec![1.0, 10.0, 2.0, 20.0, 3.0, 30.0];
        assert_eq!(extract_channel(&interleaved, 2, 0).unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(extract_channel(&interleaved, 2, 1).unwrap(), vec![10.0, 20.0, 30.0]);
        assert!(extract_channel(&interleaved, 2, 2).is_err());
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(resample_audio(&samples, 44100, 44100), samples);
    }

    #[test]
    fn test_resample_length_follows_ratio() {
        let samples = vec![0.0; 4800];
        assert_eq!(resample_audio(&samples, 48000, 44100).len(), 4410);
        assert_eq!(resample_audio(&samples, 44100, 48000).len(), 5225);
    }

    #[test]
    fn test_resample_preserves_tone() {
        use crate::probe::strength;
        use crate::tone::tone_samples;

        let tone = tone_samples(15000.0, 4800, 0.5, 48000);
        let converted = resample_audio(&tone, 48000, 44100);
        let on = strength(&converted, 15000.0, 44100);
        let off = strength(&converted, 15300.0, 44100);
        assert!(on > 5.0 * off, "on={} off={}", on, off);
    }
}
