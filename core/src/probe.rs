use crate::plan::{chunk_to_frequency, VersionSpec};
use std::cmp::Ordering;
use std::f32::consts::PI;

// Spectral probe
//
// The primary detector is a Goertzel resonator evaluated at one frequency.
// Chunk decisions run it over every grid frequency (winner-take-all); the
// grid is not aligned to FFT bins and windows are short, so an exhaustive
// single-bin sweep is used instead of a transform.
//
// Binary boundary decisions (start marker vs end marker) additionally run a
// small ensemble of detectors and take a majority vote.

/// Single-bin magnitude at `frequency`, normalised by window length
///
/// A full-scale sine of amplitude A centred on the bin reads A/2.
pub fn strength(samples: &[f32], frequency: f32, sample_rate: u32) -> f32 {
    let n = samples.len();
    if n == 0 || sample_rate == 0 {
        return 0.0;
    }

    let k = (0.5 + n as f32 * frequency / sample_rate as f32).floor();
    let omega = 2.0 * PI * k / n as f32;
    let coeff = 2.0 * omega.cos();

    let mut q1 = 0.0f32;
    let mut q2 = 0.0f32;
    for &sample in samples {
        let q0 = coeff * q1 - q2 + sample;
        q2 = q1;
        q1 = q0;
    }

    let power = q1 * q1 + q2 * q2 - q1 * q2 * coeff;
    power.max(0.0).sqrt() / n as f32
}

/// Winner of a grid sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkReading {
    pub chunk: u8,
    pub strength: f32,
    pub runner_up: f32,
}

impl ChunkReading {
    /// Winner over runner-up; large values mean an unambiguous chunk
    pub fn margin(&self) -> f32 {
        if self.runner_up > 0.0 {
            self.strength / self.runner_up
        } else {
            f32::INFINITY
        }
    }
}

/// Evaluate every grid frequency and keep the strongest
pub fn grid_argmax(samples: &[f32], spec: &VersionSpec, sample_rate: u32) -> ChunkReading {
    let mut best = ChunkReading {
        chunk: 0,
        strength: 0.0,
        runner_up: 0.0,
    };

    for chunk in 0..spec.data_grid_bins as u8 {
        let value = strength(samples, chunk_to_frequency(chunk, spec), sample_rate);
        if value > best.strength {
            best.runner_up = best.strength;
            best.strength = value;
            best.chunk = chunk;
        } else if value > best.runner_up {
            best.runner_up = value;
        }
    }

    best
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bit {
    Zero,
    One,
}

/// Binary detectors used for ensemble voting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Detector {
    Correlation,
    RelaxedCorrelation,
    DftPower,
    ZeroCrossing,
}

const CORRELATION_MIN: f32 = 0.30;
const CORRELATION_RATIO: f32 = 1.5;
const RELAXED_CORRELATION_MIN: f32 = 0.10;
const RELAXED_CORRELATION_RATIO: f32 = 1.15;
const DFT_POWER_MIN: f32 = 1e-8;
const DFT_POWER_RATIO: f32 = 2.0;
const ZERO_CROSSING_MIN_RMS: f32 = 1e-6;

impl Detector {
    pub const ALL: [Detector; 4] = [
        Detector::Correlation,
        Detector::RelaxedCorrelation,
        Detector::DftPower,
        Detector::ZeroCrossing,
    ];

    /// Decide whether the segment carries `one_hz` (One) or `zero_hz` (Zero)
    pub fn detect(&self, samples: &[f32], zero_hz: f32, one_hz: f32, sample_rate: u32) -> Option<Bit> {
        if samples.is_empty() || sample_rate == 0 {
            return None;
        }
        match self {
            Detector::Correlation => decide_pair(
                correlation_coefficient(samples, zero_hz, sample_rate),
                correlation_coefficient(samples, one_hz, sample_rate),
                CORRELATION_MIN,
                CORRELATION_RATIO,
            ),
            Detector::RelaxedCorrelation => decide_pair(
                correlation_coefficient(samples, zero_hz, sample_rate),
                correlation_coefficient(samples, one_hz, sample_rate),
                RELAXED_CORRELATION_MIN,
                RELAXED_CORRELATION_RATIO,
            ),
            Detector::DftPower => decide_pair(
                dft_power(samples, zero_hz, sample_rate),
                dft_power(samples, one_hz, sample_rate),
                DFT_POWER_MIN,
                DFT_POWER_RATIO,
            ),
            Detector::ZeroCrossing => zero_crossing_decision(samples, zero_hz, one_hz, sample_rate),
        }
    }
}

/// Run every detector and aggregate the votes
pub fn vote(samples: &[f32], zero_hz: f32, one_hz: f32, sample_rate: u32) -> Option<Bit> {
    let votes: Vec<(Detector, Option<Bit>)> = Detector::ALL
        .iter()
        .map(|d| (*d, d.detect(samples, zero_hz, one_hz, sample_rate)))
        .collect();
    tally(&votes)
}

/// Majority of non-null votes; ties go to the correlation detector
pub fn tally(votes: &[(Detector, Option<Bit>)]) -> Option<Bit> {
    let ones = votes.iter().filter(|(_, v)| *v == Some(Bit::One)).count();
    let zeros = votes.iter().filter(|(_, v)| *v == Some(Bit::Zero)).count();

    match ones.cmp(&zeros) {
        Ordering::Greater => Some(Bit::One),
        Ordering::Less => Some(Bit::Zero),
        Ordering::Equal if ones == 0 => None,
        Ordering::Equal => votes
            .iter()
            .find(|(d, _)| *d == Detector::Correlation)
            .and_then(|(_, v)| *v),
    }
}

fn decide_pair(zero: f32, one: f32, min_level: f32, min_ratio: f32) -> Option<Bit> {
    let (high, low, bit) = if one >= zero {
        (one, zero, Bit::One)
    } else {
        (zero, one, Bit::Zero)
    };

    if high < min_level {
        return None;
    }
    if low > 0.0 && high / low < min_ratio {
        return None;
    }
    Some(bit)
}

/// Sine and cosine projections of the segment at `frequency`
fn quadrature(samples: &[f32], frequency: f32, sample_rate: u32) -> (f32, f32) {
    let step = 2.0 * PI * frequency / sample_rate as f32;
    samples
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sin_acc, cos_acc), (i, &s)| {
            let phase = step * i as f32;
            (sin_acc + s * phase.sin(), cos_acc + s * phase.cos())
        })
}

/// Phase-insensitive correlation with a reference sine, in [0, 1]
fn correlation_coefficient(samples: &[f32], frequency: f32, sample_rate: u32) -> f32 {
    let n = samples.len() as f32;
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    if energy <= f32::EPSILON {
        return 0.0;
    }
    let (s, c) = quadrature(samples, frequency, sample_rate);
    ((s * s + c * c) / (energy * n / 2.0)).sqrt().min(1.0)
}

/// Explicit two-term DFT power at one frequency
fn dft_power(samples: &[f32], frequency: f32, sample_rate: u32) -> f32 {
    let n = samples.len() as f32;
    let (s, c) = quadrature(samples, frequency, sample_rate);
    (s * s + c * c) / (n * n)
}

fn zero_crossings(samples: &[f32]) -> usize {
    samples
        .windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count()
}

fn zero_crossing_decision(samples: &[f32], zero_hz: f32, one_hz: f32, sample_rate: u32) -> Option<Bit> {
    let n = samples.len() as f32;
    let rms = (samples.iter().map(|s| s * s).sum::<f32>() / n).sqrt();
    if rms < ZERO_CROSSING_MIN_RMS {
        return None;
    }

    let observed = zero_crossings(samples) as f32;
    let expected_zero = 2.0 * zero_hz * n / sample_rate as f32;
    let expected_one = 2.0 * one_hz * n / sample_rate as f32;
    let tolerance = (expected_one - expected_zero).abs() / 2.0;

    let dist_zero = (observed - expected_zero).abs();
    let dist_one = (observed - expected_one).abs();
    let (nearest, bit) = if dist_one <= dist_zero {
        (dist_one, Bit::One)
    } else {
        (dist_zero, Bit::Zero)
    };

    if nearest <= tolerance {
        Some(bit)
    } else {
        None
    }
}
