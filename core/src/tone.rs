use crate::error::{Result, TonemarkError};
use std::f32::consts::PI;

/// Envelope ratio (10% of the tone on each side)
const ENVELOPE_RATIO: f32 = 0.10;

/// Upper bound on attack/release length in samples
const ENVELOPE_MAX_SAMPLES: usize = 512;

/// Generate a sine tone of the given duration with a linear attack/release envelope
pub fn tone(frequency: f32, duration_secs: f32, amplitude: f32, sample_rate: u32) -> Result<Vec<f32>> {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Err(TonemarkError::InvalidInput(format!(
            "tone duration must be positive, got {}",
            duration_secs
        )));
    }
    if sample_rate == 0 {
        return Err(TonemarkError::InvalidInput("sample rate must be non-zero".to_string()));
    }

    let num_samples = (duration_secs * sample_rate as f32).round() as usize;
    if num_samples == 0 {
        return Err(TonemarkError::InvalidInput(format!(
            "tone of {} s is shorter than one sample",
            duration_secs
        )));
    }

    Ok(tone_samples(frequency, num_samples, amplitude, sample_rate))
}

/// Generate exactly `num_samples` of an enveloped sine tone
///
/// Every tone starts at phase zero, so identical inputs always give identical
/// sample buffers.
pub fn tone_samples(frequency: f32, num_samples: usize, amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let sample_rate = sample_rate as f32;
    let mut samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate;
            amplitude * (2.0 * PI * frequency * t).sin()
        })
        .collect();

    apply_envelope(&mut samples);
    samples
}

pub fn silence(num_samples: usize) -> Vec<f32> {
    vec![0.0; num_samples]
}

fn envelope_length(len: usize) -> usize {
    let ramp = ((len as f32) * ENVELOPE_RATIO).round() as usize;
    ramp.min(ENVELOPE_MAX_SAMPLES).min(len / 2)
}

/// Linear fade in over the first samples and fade out over the last ones
fn apply_envelope(samples: &mut [f32]) {
    let len = samples.len();
    let ramp = envelope_length(len);
    if ramp == 0 {
        return;
    }

    for i in 0..ramp {
        let gain = i as f32 / ramp as f32;
        samples[i] *= gain;
        samples[len - 1 - i] *= gain;
    }
}

/// Peak absolute sample value
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}
