use crate::budget::Budget;
use crate::codec::{MatrixCodec, QrCodec};
use crate::demod::{assemble, demodulate_cycle, merge_slots, CycleReading};
use crate::error::{Result, TonemarkError};
use crate::plan::{min_sample_rate, spec_for_band, Band, VersionSpec};
use crate::scan::{refine_alignment, scan_markers, Candidate, ScanParams, ScanReport};
use crate::{
    BOUNDARY_PENALTY, CORRUPTION_CEILING, FALLBACK_ABSOLUTE_FLOOR, FALLBACK_HOP_MS, FALLBACK_MAX_CANDIDATES,
    FALLBACK_THRESHOLD_FRACTION, FALLBACK_WINDOW_MS, MAX_CANDIDATES, MIN_CANDIDATE_SEPARATION_SECS, MIN_VERSION,
    SCAN_ABSOLUTE_FLOOR, SCAN_HOP_MS, SCAN_THRESHOLD_FRACTION, SCAN_WINDOW_MS,
};
use std::time::Duration;

/// Decoder configuration
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub band: Band,
    pub scan: ScanParams,
    /// Scan used once every regular candidate has failed (version 1 only)
    pub fallback_scan: ScanParams,
    /// Largest tolerated share of corrupted columns per cycle
    pub corruption_ceiling: f32,
    /// Confidence multiplier when the end marker is not heard
    pub boundary_penalty: f32,
    pub timeout: Option<Duration>,
    pub consensus: bool,
    pub emergency_fallback: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            band: Band::Mobile,
            scan: ScanParams {
                window_ms: SCAN_WINDOW_MS,
                hop_ms: SCAN_HOP_MS,
                threshold_fraction: SCAN_THRESHOLD_FRACTION,
                absolute_floor: SCAN_ABSOLUTE_FLOOR,
                min_separation_secs: MIN_CANDIDATE_SEPARATION_SECS,
                max_candidates: MAX_CANDIDATES,
            },
            fallback_scan: ScanParams {
                window_ms: FALLBACK_WINDOW_MS,
                hop_ms: FALLBACK_HOP_MS,
                threshold_fraction: FALLBACK_THRESHOLD_FRACTION,
                absolute_floor: FALLBACK_ABSOLUTE_FLOOR,
                min_separation_secs: MIN_CANDIDATE_SEPARATION_SECS,
                max_candidates: FALLBACK_MAX_CANDIDATES,
            },
            corruption_ceiling: CORRUPTION_CEILING,
            boundary_penalty: BOUNDARY_PENALTY,
            timeout: None,
            consensus: true,
            emergency_fallback: true,
        }
    }
}

/// How a successful decode was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// A single ranked candidate decoded on its own
    Candidate,
    /// Several readings of one version were merged slot by slot
    Consensus,
    /// The narrow-window emergency scan found the cycle
    Fallback,
}

impl Recovery {
    pub fn name(&self) -> &'static str {
        match self {
            Recovery::Candidate => "candidate",
            Recovery::Consensus => "consensus",
            Recovery::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutcome {
    pub text: String,
    pub version: u8,
    pub confidence: f32,
    pub candidates_examined: usize,
    pub start_seconds: f32,
    pub corrupted_columns: Vec<usize>,
    pub boundary_confirmed: bool,
    pub recovery: Recovery,
}

/// Marker scanning, alignment and demodulation without any matrix codec
///
/// Produces `CycleReading`s; deciding whether a reading holds a payload is
/// left to `Decoder`.
pub struct FrameDecoder {
    config: DecoderConfig,
}

impl FrameDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Regular scan over every version of the configured band
    pub fn scan(&self, samples: &[f32], sample_rate: u32, budget: &Budget) -> Result<ScanReport> {
        let specs: Vec<&VersionSpec> = self.config.band.specs().iter().collect();
        scan_markers(samples, sample_rate, &specs, &self.config.scan, budget)
    }

    /// Narrow-window scan restricted to version 1
    pub fn fallback_scan(&self, samples: &[f32], sample_rate: u32, budget: &Budget) -> Result<ScanReport> {
        let spec = spec_for_band(self.config.band, MIN_VERSION)?;
        scan_markers(samples, sample_rate, &[spec], &self.config.fallback_scan, budget)
    }

    /// Align a candidate on its start marker and demodulate the cycle behind it
    pub fn read_cycle(
        &self,
        samples: &[f32],
        sample_rate: u32,
        candidate: &Candidate,
        budget: &Budget,
        candidates_found: usize,
    ) -> Result<CycleReading> {
        let spec = spec_for_band(self.config.band, candidate.version)?;
        let (start, aligned_strength) = refine_alignment(samples, sample_rate, spec, candidate.start_sample);
        budget.check(candidates_found)?;

        log::debug!(
            "Aligned version {} candidate {} -> {} (strength {:.6} -> {:.6})",
            candidate.version,
            candidate.start_sample,
            start,
            candidate.strength,
            aligned_strength
        );

        let mut reading = demodulate_cycle(
            samples,
            sample_rate,
            spec,
            start,
            candidate.confidence,
            budget,
            candidates_found,
        )?;
        if !reading.boundary_confirmed {
            reading.confidence *= self.config.boundary_penalty;
        }
        Ok(reading)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DecoderConfig::default())
    }
}

/// Failure bookkeeping for one decode invocation
#[derive(Default)]
struct Attempts {
    examined: usize,
    max_marker_strength: f32,
    /// Version of the last matrix handed to the codec
    codec_version: Option<u8>,
    worst_corruption: Option<(usize, usize)>,
    readings: Vec<CycleReading>,
}

impl Attempts {
    fn record_corruption(&mut self, reading: &CycleReading) {
        let observed = (reading.corrupted_columns.len(), reading.matrix.size());
        let worse = match self.worst_corruption {
            Some((corrupted, total)) => observed.0 * total > corrupted * observed.1,
            None => true,
        };
        if worse {
            self.worst_corruption = Some(observed);
        }
    }

    fn exhausted(self) -> TonemarkError {
        if let Some(version) = self.codec_version {
            TonemarkError::ExternalDecodeFailure {
                version,
                candidates_examined: self.examined,
            }
        } else if let Some((corrupted_columns, total_columns)) = self.worst_corruption {
            TonemarkError::CycleCorrupted {
                corrupted_columns,
                total_columns,
            }
        } else {
            TonemarkError::NoCycleDetected {
                max_marker_strength: self.max_marker_strength,
            }
        }
    }
}

/// Text-level decoder: frame decoding with candidate retry, consensus and
/// emergency fallback, followed by the matrix codec
pub struct Decoder<C: MatrixCodec = QrCodec> {
    codec: C,
    frame: FrameDecoder,
}

impl Decoder<QrCodec> {
    pub fn new() -> Self {
        Self::with_codec(QrCodec::default(), DecoderConfig::default())
    }

    pub fn with_config(config: DecoderConfig) -> Self {
        Self::with_codec(QrCodec::default(), config)
    }
}

impl<C: MatrixCodec> Decoder<C> {
    pub fn with_codec(codec: C, config: DecoderConfig) -> Self {
        Self {
            codec,
            frame: FrameDecoder::new(config),
        }
    }

    pub fn frame_decoder(&self) -> &FrameDecoder {
        &self.frame
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn config(&self) -> &DecoderConfig {
        self.frame.config()
    }

    /// Decode with the configured timeout
    pub fn decode(&self, samples: &[f32], sample_rate: u32) -> Result<DecodeOutcome> {
        self.decode_within(samples, sample_rate, self.config().timeout)
    }

    /// Decode under an explicit wall-clock budget (`None` for unbounded)
    pub fn decode_within(&self, samples: &[f32], sample_rate: u32, budget: Option<Duration>) -> Result<DecodeOutcome> {
        let config = self.config();
        if sample_rate < min_sample_rate(config.band) {
            return Err(TonemarkError::InvalidInput(format!(
                "sample rate {} Hz is below the {} Hz the {} band needs",
                sample_rate,
                min_sample_rate(config.band),
                config.band.name()
            )));
        }
        let budget = Budget::new(budget);
        let mut attempts = Attempts::default();

        log::info!(
            "Decoding {} samples ({:.2} s at {} Hz, {} band)",
            samples.len(),
            samples.len() as f32 / sample_rate as f32,
            sample_rate,
            config.band.name()
        );

        let report = self.frame.scan(samples, sample_rate, &budget)?;
        attempts.max_marker_strength = report.max_strength;
        if let Some(outcome) =
            self.try_candidates(samples, sample_rate, &report.candidates, Recovery::Candidate, &budget, &mut attempts)?
        {
            return Ok(outcome);
        }
        budget.check(attempts.examined)?;

        if config.consensus {
            if let Some(outcome) = self.try_consensus(sample_rate, &mut attempts)? {
                return Ok(outcome);
            }
            budget.check(attempts.examined)?;
        }

        if config.emergency_fallback {
            log::warn!("Regular scan exhausted, running emergency fallback scan");
            let report = self.frame.fallback_scan(samples, sample_rate, &budget)?;
            attempts.max_marker_strength = attempts.max_marker_strength.max(report.max_strength);
            if let Some(outcome) =
                self.try_candidates(samples, sample_rate, &report.candidates, Recovery::Fallback, &budget, &mut attempts)?
            {
                return Ok(outcome);
            }
        }

        let err = attempts.exhausted();
        log::warn!("Decode failed: {}", err);
        Err(err)
    }

    fn try_candidates(
        &self,
        samples: &[f32],
        sample_rate: u32,
        candidates: &[Candidate],
        recovery: Recovery,
        budget: &Budget,
        attempts: &mut Attempts,
    ) -> Result<Option<DecodeOutcome>> {
        for candidate in candidates {
            attempts.examined += 1;
            let reading = match self.frame.read_cycle(samples, sample_rate, candidate, budget, attempts.examined) {
                Ok(reading) => reading,
                Err(err @ TonemarkError::Timeout { .. }) => return Err(err),
                Err(err) => {
                    log::debug!("Candidate at sample {} skipped: {}", candidate.start_sample, err);
                    continue;
                }
            };

            let outcome = self.finish(&reading, sample_rate, recovery, attempts);
            if recovery == Recovery::Candidate {
                attempts.readings.push(reading);
            }
            if outcome.is_some() {
                return Ok(outcome);
            }
        }
        Ok(None)
    }

    /// Merge same-version readings and try the merged matrix once per version
    fn try_consensus(&self, sample_rate: u32, attempts: &mut Attempts) -> Result<Option<DecodeOutcome>> {
        let mut versions: Vec<u8> = attempts.readings.iter().map(|r| r.version).collect();
        versions.sort_unstable();
        versions.dedup();

        for version in versions {
            let group: Vec<&CycleReading> = attempts.readings.iter().filter(|r| r.version == version).collect();
            if group.len() < 2 {
                continue;
            }
            let spec = spec_for_band(self.config().band, version)?;
            let slots = merge_slots(&group);
            let (matrix, corrupted_columns) = assemble(&slots, spec);
            let confidence = group.iter().map(|r| r.confidence).sum::<f32>() / group.len() as f32;

            log::info!(
                "Consensus over {} version {} readings: {} corrupted column(s)",
                group.len(),
                version,
                corrupted_columns.len()
            );

            let merged = CycleReading {
                version,
                start_sample: group.iter().map(|r| r.start_sample).min().unwrap_or(0),
                confidence,
                boundary_confirmed: group.iter().any(|r| r.boundary_confirmed),
                slots,
                matrix,
                corrupted_columns,
            };
            if let Some(outcome) = self.finish(&merged, sample_rate, Recovery::Consensus, attempts) {
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Validate a reading and hand it to the codec
    fn finish(
        &self,
        reading: &CycleReading,
        sample_rate: u32,
        recovery: Recovery,
        attempts: &mut Attempts,
    ) -> Option<DecodeOutcome> {
        if let Err(err) = reading.validate(self.config().corruption_ceiling) {
            log::debug!("Version {} reading at sample {} rejected: {}", reading.version, reading.start_sample, err);
            attempts.record_corruption(reading);
            return None;
        }

        attempts.codec_version = Some(reading.version);
        match self.codec.decode_matrix(&reading.matrix) {
            Some(text) => {
                log::info!(
                    "Decoded {} bytes from version {} cycle at {:.3} s ({})",
                    text.len(),
                    reading.version,
                    reading.start_sample as f32 / sample_rate as f32,
                    recovery.name()
                );
                Some(DecodeOutcome {
                    text,
                    version: reading.version,
                    confidence: reading.confidence,
                    candidates_examined: attempts.examined,
                    start_seconds: reading.start_sample as f32 / sample_rate as f32,
                    corrupted_columns: reading.corrupted_columns.clone(),
                    boundary_confirmed: reading.boundary_confirmed,
                    recovery,
                })
            }
            None => {
                log::debug!(
                    "Matrix codec rejected version {} reading at sample {}",
                    reading.version,
                    reading.start_sample
                );
                None
            }
        }
    }
}

impl Default for Decoder<QrCodec> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::matrix::BitMatrix;
    use std::cell::Cell;

    const RATE: u32 = 44100;

    /// Accepts any matrix and counts how often it was asked
    struct CountingCodec {
        calls: Cell<usize>,
    }

    impl MatrixCodec for CountingCodec {
        fn encode_text(&self, _text: &str, version: u8) -> Result<BitMatrix> {
            Ok(BitMatrix::new(spec_for_band(Band::Mobile, version)?.matrix_size))
        }

        fn decode_matrix(&self, _matrix: &BitMatrix) -> Option<String> {
            self.calls.set(self.calls.get() + 1);
            None
        }
    }

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert_eq!(config.scan.window_ms, 100);
        assert_eq!(config.scan.hop_ms, 50);
        assert_eq!(config.fallback_scan.window_ms, 20);
        assert_eq!(config.fallback_scan.max_candidates, 3);
        assert_eq!(config.corruption_ceiling, 0.30);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_silence_reports_no_cycle() {
        let decoder = Decoder::new();
        let err = decoder.decode(&vec![0.0; RATE as usize * 2], RATE).unwrap_err();
        assert_eq!(err, TonemarkError::NoCycleDetected { max_marker_strength: 0.0 });
    }

    #[test]
    fn test_empty_input_reports_no_cycle() {
        let err = Decoder::new().decode(&[], RATE).unwrap_err();
        assert!(matches!(err, TonemarkError::NoCycleDetected { .. }));
    }

    #[test]
    fn test_low_sample_rate_rejected() {
        let err = Decoder::new().decode(&vec![0.0; 8000], 8000).unwrap_err();
        assert!(matches!(err, TonemarkError::InvalidInput(_)));
    }

    #[test]
    fn test_decode_single_cycle() {
        let spec = spec_for_band(Band::Mobile, 1).unwrap();
        let carrier = vec![0.0; spec.cycle_samples(RATE) + RATE as usize];
        let mixed = Encoder::new().encode(&carrier, RATE, "Hello World", 1, 1).unwrap();

        let outcome = Decoder::new().decode(&mixed, RATE).unwrap();
        assert_eq!(outcome.text, "Hello World");
        assert_eq!(outcome.version, 1);
        assert_eq!(outcome.recovery, Recovery::Candidate);
        assert!(outcome.boundary_confirmed);
        assert!(outcome.corrupted_columns.is_empty());
        assert!(outcome.start_seconds < 0.01);
    }

    #[test]
    fn test_codec_rejection_surfaces_external_failure() {
        let spec = spec_for_band(Band::Mobile, 1).unwrap();
        let carrier = vec![0.0; spec.cycle_samples(RATE) * 2];
        let mixed = Encoder::new().encode(&carrier, RATE, "rejected", 1, 2).unwrap();

        let codec = CountingCodec { calls: Cell::new(0) };
        let decoder = Decoder::with_codec(codec, DecoderConfig::default());
        let err = decoder.decode(&mixed, RATE).unwrap_err();
        assert!(matches!(err, TonemarkError::ExternalDecodeFailure { version: 1, .. }));
        // Two cycles, one consensus pass, then the fallback candidates
        assert!(decoder.codec().calls.get() >= 3);
    }

    #[test]
    fn test_zero_budget_times_out() {
        let decoder = Decoder::new();
        let err = decoder
            .decode_within(&vec![0.0; RATE as usize], RATE, Some(Duration::ZERO))
            .unwrap_err();
        assert!(matches!(err, TonemarkError::Timeout { .. }));
    }

    #[test]
    fn test_timeout_on_silence_reports_no_candidates() {
        let decoder = Decoder::new();
        let err = decoder
            .decode_within(&vec![0.0; RATE as usize * 120], RATE, Some(Duration::from_millis(1)))
            .unwrap_err();
        assert!(
            matches!(err, TonemarkError::Timeout { candidates_found: 0, .. }),
            "got {:?}",
            err
        );
    }

    #[test]
    fn test_rate_too_low_for_highest_version_rejected() {
        // Carries version 1 but not the version 5 markers at 17000/17100 Hz
        assert!(crate::plan::check_sample_rate(spec_for_band(Band::Mobile, 1).unwrap(), 34000).is_ok());
        let err = Decoder::new().decode(&vec![0.0; 34000], 34000).unwrap_err();
        assert!(matches!(err, TonemarkError::InvalidInput(_)), "got {:?}", err);
    }

    #[test]
    fn test_recovery_names() {
        assert_eq!(Recovery::Candidate.name(), "candidate");
        assert_eq!(Recovery::Consensus.name(), "consensus");
        assert_eq!(Recovery::Fallback.name(), "fallback");
    }
}
