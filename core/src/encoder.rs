use crate::chunking::matrix_chunks;
use crate::codec::{MatrixCodec, QrCodec};
use crate::error::{Result, TonemarkError};
use crate::matrix::BitMatrix;
use crate::plan::{check_sample_rate, chunk_to_frequency, spec_for_band, Band, VersionSpec};
use crate::tone::{peak, silence, tone_samples};
use crate::{DEFAULT_CYCLES, EMBED_RATIO, FLOOR_AMPLITUDE};

/// Encoder configuration
#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub band: Band,
    /// Embedding level relative to the carrier peak
    pub embed_ratio: f32,
    /// Lowest embedding amplitude, used for quiet or silent carriers
    pub floor_amplitude: f32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            band: Band::Mobile,
            embed_ratio: EMBED_RATIO,
            floor_amplitude: FLOOR_AMPLITUDE,
        }
    }
}

/// Turns a bit matrix into framed tone bursts and mixes them into a carrier
///
/// One cycle is: start marker, every column's chunks left to right, end
/// marker, silence gap. Cycles are repeated back to back from the first
/// carrier sample.
pub struct FrameEncoder {
    config: EncoderConfig,
}

impl FrameEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Chunk values in transmission order for one cycle
    pub fn chunk_sequence(&self, matrix: &BitMatrix, version: u8) -> Result<Vec<u8>> {
        let spec = spec_for_band(self.config.band, version)?;
        check_matrix(matrix, spec)?;
        Ok(matrix_chunks(matrix, spec))
    }

    /// Amplitude used for every tone, proportional to the carrier with a floor
    pub fn embed_amplitude(&self, carrier: &[f32]) -> f32 {
        (peak(carrier) * self.config.embed_ratio).max(self.config.floor_amplitude)
    }

    /// Control signal only (no carrier): `cycles` framed transmissions
    pub fn control_signal(
        &self,
        matrix: &BitMatrix,
        version: u8,
        cycles: usize,
        amplitude: f32,
        sample_rate: u32,
    ) -> Result<Vec<f32>> {
        let spec = spec_for_band(self.config.band, version)?;
        check_matrix(matrix, spec)?;
        check_sample_rate(spec, sample_rate)?;
        if cycles == 0 {
            return Err(TonemarkError::InvalidInput("at least one cycle is required".to_string()));
        }

        let chunks = matrix_chunks(matrix, spec);
        let cycle = synthesize_cycle(spec, &chunks, amplitude, sample_rate);
        debug_assert_eq!(cycle.len(), spec.cycle_samples(sample_rate));

        let mut control = Vec::with_capacity(cycle.len() * cycles);
        for _ in 0..cycles {
            control.extend_from_slice(&cycle);
        }
        Ok(control)
    }

    /// Mix `cycles` transmissions of `matrix` into a mono carrier
    ///
    /// The carrier must hold at least one full cycle. The result is as long as
    /// the longer of the carrier and the control signal.
    pub fn encode(
        &self,
        carrier: &[f32],
        matrix: &BitMatrix,
        version: u8,
        cycles: usize,
        sample_rate: u32,
    ) -> Result<Vec<f32>> {
        let spec = spec_for_band(self.config.band, version)?;
        check_carrier_duration(spec, carrier.len(), sample_rate)?;

        let amplitude = self.embed_amplitude(carrier);
        let control = self.control_signal(matrix, version, cycles, amplitude, sample_rate)?;

        log::debug!(
            "Embedding version {} ({} band) x{} at amplitude {:.4}: {} control samples into {} carrier samples",
            version,
            spec.band.name(),
            cycles,
            amplitude,
            control.len(),
            carrier.len()
        );

        Ok(mix(carrier, &control))
    }

    /// Embed into channel 0 of an interleaved multi-channel carrier
    ///
    /// Other channels are passed through untouched (zero-padded if the control
    /// signal outlasts the carrier).
    pub fn encode_interleaved(
        &self,
        carrier: &[f32],
        channels: usize,
        matrix: &BitMatrix,
        version: u8,
        cycles: usize,
        sample_rate: u32,
    ) -> Result<Vec<f32>> {
        if channels == 0 || carrier.len() % channels != 0 {
            return Err(TonemarkError::InvalidInput(format!(
                "{} samples do not divide into {} channels",
                carrier.len(),
                channels
            )));
        }

        let first: Vec<f32> = carrier.iter().step_by(channels).copied().collect();
        let mixed = self.encode(&first, matrix, version, cycles, sample_rate)?;

        let frames = mixed.len();
        let mut output = vec![0.0; frames * channels];
        for (frame, &value) in mixed.iter().enumerate() {
            output[frame * channels] = value;
            for ch in 1..channels {
                output[frame * channels + ch] = carrier.get(frame * channels + ch).copied().unwrap_or(0.0);
            }
        }
        Ok(output)
    }
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(EncoderConfig::default())
    }
}

fn check_matrix(matrix: &BitMatrix, spec: &VersionSpec) -> Result<()> {
    if matrix.size() != spec.matrix_size {
        return Err(TonemarkError::InvalidInput(format!(
            "version {} expects a {}x{} matrix, got {}x{}",
            spec.version,
            spec.matrix_size,
            spec.matrix_size,
            matrix.size(),
            matrix.size()
        )));
    }
    Ok(())
}

/// Fail before any synthesis when the carrier cannot hold one cycle
fn check_carrier_duration(spec: &VersionSpec, carrier_len: usize, sample_rate: u32) -> Result<()> {
    let required = spec.cycle_samples(sample_rate);
    if carrier_len < required {
        return Err(TonemarkError::InsufficientCarrierDuration {
            required,
            available: carrier_len,
        });
    }
    Ok(())
}

fn synthesize_cycle(spec: &VersionSpec, chunks: &[u8], amplitude: f32, sample_rate: u32) -> Vec<f32> {
    let marker_len = spec.marker_samples(sample_rate);
    let chunk_len = spec.chunk_samples(sample_rate);

    let mut cycle = Vec::with_capacity(spec.cycle_samples(sample_rate));
    cycle.extend(tone_samples(spec.start_marker_hz, marker_len, amplitude, sample_rate));
    for &chunk in chunks {
        cycle.extend(tone_samples(chunk_to_frequency(chunk, spec), chunk_len, amplitude, sample_rate));
    }
    cycle.extend(tone_samples(spec.end_marker_hz, marker_len, amplitude, sample_rate));
    cycle.extend(silence(spec.gap_samples(sample_rate)));
    cycle
}

/// Additive mix; output length is the longer of the two inputs
fn mix(carrier: &[f32], control: &[f32]) -> Vec<f32> {
    let len = carrier.len().max(control.len());
    (0..len)
        .map(|i| carrier.get(i).copied().unwrap_or(0.0) + control.get(i).copied().unwrap_or(0.0))
        .collect()
}

/// Stereo output with the mark only in the left channel
///
/// `mixed` is the encoder output, `carrier` the untouched mono carrier that
/// fills the right channel.
pub fn duplicate_to_stereo(mixed: &[f32], carrier: &[f32]) -> Vec<f32> {
    let mut output = Vec::with_capacity(mixed.len() * 2);
    for (i, &left) in mixed.iter().enumerate() {
        output.push(left);
        output.push(carrier.get(i).copied().unwrap_or(0.0));
    }
    output
}

/// Text-level encoder: matrix codec followed by the frame encoder
pub struct Encoder<C: MatrixCodec = QrCodec> {
    codec: C,
    frame: FrameEncoder,
}

impl Encoder<QrCodec> {
    pub fn new() -> Self {
        Self::with_codec(QrCodec::default(), EncoderConfig::default())
    }
}

impl<C: MatrixCodec> Encoder<C> {
    pub fn with_codec(codec: C, config: EncoderConfig) -> Self {
        Self {
            codec,
            frame: FrameEncoder::new(config),
        }
    }

    pub fn frame_encoder(&self) -> &FrameEncoder {
        &self.frame
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encode `text` at `version` and mix `cycles` copies into the carrier
    pub fn encode(&self, carrier: &[f32], sample_rate: u32, text: &str, version: u8, cycles: usize) -> Result<Vec<f32>> {
        let spec = spec_for_band(self.frame.config().band, version)?;
        check_sample_rate(spec, sample_rate)?;
        check_carrier_duration(spec, carrier.len(), sample_rate)?;

        let matrix = self.codec.encode_text(text, version)?;
        log::info!(
            "Encoding {} bytes as a {}x{} matrix ({} dark modules)",
            text.len(),
            matrix.size(),
            matrix.size(),
            matrix.dark_modules()
        );
        self.frame.encode(carrier, &matrix, version, cycles, sample_rate)
    }

    /// Encode with the default cycle count
    pub fn encode_default(&self, carrier: &[f32], sample_rate: u32, text: &str, version: u8) -> Result<Vec<f32>> {
        self.encode(carrier, sample_rate, text, version, DEFAULT_CYCLES)
    }
}

impl Default for Encoder<QrCodec> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::spec_for;
    use crate::probe::strength;
    use crate::DEFAULT_SAMPLE_RATE;

    const RATE: u32 = DEFAULT_SAMPLE_RATE;

    fn pattern_matrix(size: usize) -> BitMatrix {
        let mut m = BitMatrix::new(size);
        for row in 0..size {
            for col in 0..size {
                m.set(row, col, (row * 7 + col * 3) % 5 < 2);
            }
        }
        m
    }

    #[test]
    fn test_chunk_sequence_length() {
        let encoder = FrameEncoder::default();
        let chunks = encoder.chunk_sequence(&pattern_matrix(21), 1).unwrap();
        assert_eq!(chunks.len(), 21 * 4);
        assert!(chunks.iter().all(|&c| c < 64));
    }

    #[test]
    fn test_chunk_sequence_deterministic() {
        let encoder = FrameEncoder::default();
        let m = pattern_matrix(29);
        assert_eq!(encoder.chunk_sequence(&m, 3).unwrap(), encoder.chunk_sequence(&m, 3).unwrap());
    }

    #[test]
    fn test_matrix_size_must_match_version() {
        let encoder = FrameEncoder::default();
        assert!(encoder.chunk_sequence(&pattern_matrix(25), 1).is_err());
    }

    #[test]
    fn test_encode_output_length() {
        let spec = spec_for(1).unwrap();
        let encoder = FrameEncoder::default();
        let carrier = vec![0.0; spec.cycle_samples(RATE) + 1000];

        let one = encoder.encode(&carrier, &pattern_matrix(21), 1, 1, RATE).unwrap();
        assert_eq!(one.len(), carrier.len());

        let three = encoder.encode(&carrier, &pattern_matrix(21), 1, 3, RATE).unwrap();
        assert_eq!(three.len(), 3 * spec.cycle_samples(RATE));
    }

    #[test]
    fn test_short_carrier_rejected() {
        let spec = spec_for(1).unwrap();
        let encoder = FrameEncoder::default();
        let carrier = vec![0.0; spec.cycle_samples(RATE) - 1];
        let err = encoder.encode(&carrier, &pattern_matrix(21), 1, 3, RATE).unwrap_err();
        assert_eq!(
            err,
            TonemarkError::InsufficientCarrierDuration {
                required: spec.cycle_samples(RATE),
                available: carrier.len(),
            }
        );
    }

    #[test]
    fn test_zero_cycles_rejected() {
        let spec = spec_for(1).unwrap();
        let encoder = FrameEncoder::default();
        let carrier = vec![0.0; spec.cycle_samples(RATE)];
        assert!(encoder.encode(&carrier, &pattern_matrix(21), 1, 0, RATE).is_err());
    }

    #[test]
    fn test_embed_amplitude_floor_and_ratio() {
        let encoder = FrameEncoder::default();
        assert_eq!(encoder.embed_amplitude(&[0.0; 10]), FLOOR_AMPLITUDE);
        assert!((encoder.embed_amplitude(&[0.9, -0.8]) - 0.09).abs() < 1e-6);
    }

    #[test]
    fn test_start_marker_at_cycle_start() {
        let spec = spec_for(2).unwrap();
        let encoder = FrameEncoder::default();
        let carrier = vec![0.0; spec.cycle_samples(RATE)];
        let out = encoder.encode(&carrier, &pattern_matrix(25), 2, 2, RATE).unwrap();

        let marker_len = spec.marker_samples(RATE);
        for cycle in 0..2 {
            let start = cycle * spec.cycle_samples(RATE);
            let window = &out[start..start + marker_len];
            let on = strength(window, spec.start_marker_hz, RATE);
            let off = strength(window, spec.end_marker_hz, RATE);
            assert!(on > 10.0 * off);
        }
    }

    #[test]
    fn test_interleaved_embeds_first_channel_only() {
        let spec = spec_for(1).unwrap();
        let encoder = FrameEncoder::default();
        let frames = spec.cycle_samples(RATE);
        let carrier: Vec<f32> = (0..frames * 2).map(|i| if i % 2 == 1 { 0.25 } else { 0.0 }).collect();

        let out = encoder.encode_interleaved(&carrier, 2, &pattern_matrix(21), 1, 1, RATE).unwrap();
        assert_eq!(out.len(), carrier.len());
        assert!(out.iter().skip(1).step_by(2).all(|&s| s == 0.25));
        assert!(out.iter().step_by(2).any(|&s| s.abs() > 0.01));
    }

    #[test]
    fn test_interleaved_rejects_ragged_input() {
        let encoder = FrameEncoder::default();
        assert!(encoder.encode_interleaved(&[0.0; 5], 2, &pattern_matrix(21), 1, 1, RATE).is_err());
    }

    #[test]
    fn test_duplicate_to_stereo() {
        let stereo = duplicate_to_stereo(&[1.0, 2.0, 3.0], &[0.5, 0.5]);
        assert_eq!(stereo, vec![1.0, 0.5, 2.0, 0.5, 3.0, 0.0]);
    }

    #[test]
    fn test_text_encoder_rejects_low_sample_rate() {
        let encoder = Encoder::new();
        let carrier = vec![0.0; 16000 * 20];
        assert!(encoder.encode(&carrier, 16000, "hi", 1, 1).is_err());
    }
}
