use crate::budget::Budget;
use crate::error::Result;
use crate::plan::{ms_to_samples, VersionSpec};
use crate::probe::{strength, vote, Bit};
use std::cmp::Ordering;

/// Scan windows between two budget checks
const BUDGET_CHECK_INTERVAL: usize = 64;

/// Candidates weaker than this multiple of the threshold get a second opinion
const AMBIGUITY_FACTOR: f32 = 2.0;

/// Alignment search: coarse ±100 ms in 5 ms steps, then ±10 ms in 0.25 ms steps
const COARSE_ALIGN_SPAN_MS: f32 = 100.0;
const COARSE_ALIGN_STEP_MS: f32 = 5.0;
const FINE_ALIGN_SPAN_MS: f32 = 10.0;
const FINE_ALIGN_STEP_MS: f32 = 0.25;

/// Sliding-window marker scan parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ScanParams {
    pub window_ms: u32,
    pub hop_ms: u32,
    /// Fraction of the strongest observed marker a window must exceed
    pub threshold_fraction: f32,
    /// Threshold never drops below this strength
    pub absolute_floor: f32,
    /// Hits of one version closer than this are merged
    pub min_separation_secs: f32,
    pub max_candidates: usize,
}

/// Hypothesised cycle start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub version: u8,
    pub start_sample: usize,
    pub strength: f32,
    /// Strength relative to the strongest marker seen in the scan, in [0, 1]
    pub confidence: f32,
}

impl Candidate {
    pub fn start_seconds(&self, sample_rate: u32) -> f32 {
        self.start_sample as f32 / sample_rate as f32
    }
}

/// Outcome of one scan pass
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Ranked by confidence, strongest first, capped at `max_candidates`
    pub candidates: Vec<Candidate>,
    pub max_strength: f32,
    pub noise_floor: f32,
    pub threshold: f32,
    pub windows: usize,
}

/// Accumulator local to one scan pass
#[derive(Default)]
struct ScanState {
    hits: Vec<Candidate>,
    max_strength: f32,
    strength_sum: f64,
    readings: usize,
}

impl ScanState {
    fn record(&mut self, version: u8, start_sample: usize, value: f32) {
        self.max_strength = self.max_strength.max(value);
        self.strength_sum += value as f64;
        self.readings += 1;
        self.hits.push(Candidate {
            version,
            start_sample,
            strength: value,
            confidence: 0.0,
        });
    }

    /// Hits above the threshold the scan would apply if it ended now
    fn provisional_candidates(&self, params: &ScanParams) -> usize {
        let threshold = (self.max_strength * params.threshold_fraction).max(params.absolute_floor);
        self.hits.iter().filter(|hit| hit.strength > threshold).count()
    }

    fn noise_floor(&self) -> f32 {
        if self.readings == 0 {
            0.0
        } else {
            (self.strength_sum / self.readings as f64) as f32
        }
    }
}

fn by_strength_then_position(a: &Candidate, b: &Candidate) -> Ordering {
    b.strength
        .partial_cmp(&a.strength)
        .unwrap_or(Ordering::Equal)
        .then(a.start_sample.cmp(&b.start_sample))
}

/// Slide a window over the buffer and collect start-marker candidates for every spec
pub fn scan_markers(
    samples: &[f32],
    sample_rate: u32,
    specs: &[&VersionSpec],
    params: &ScanParams,
    budget: &Budget,
) -> Result<ScanReport> {
    let window = ms_to_samples(params.window_ms, sample_rate).max(1);
    let hop = ms_to_samples(params.hop_ms, sample_rate).max(1);

    let mut state = ScanState::default();
    if samples.len() < window || specs.is_empty() {
        return Ok(ScanReport::default());
    }

    let mut windows = 0;
    for (idx, pos) in (0..=samples.len() - window).step_by(hop).enumerate() {
        if idx % BUDGET_CHECK_INTERVAL == 0 && budget.is_limited() {
            budget.check(state.provisional_candidates(params))?;
        }
        let segment = &samples[pos..pos + window];
        for spec in specs {
            state.record(spec.version, pos, strength(segment, spec.start_marker_hz, sample_rate));
        }
        windows += 1;
    }

    let threshold = (state.max_strength * params.threshold_fraction).max(params.absolute_floor);
    let min_separation = (params.min_separation_secs * sample_rate as f32) as usize;

    let mut above: Vec<Candidate> = state
        .hits
        .iter()
        .filter(|hit| hit.strength > threshold)
        .copied()
        .collect();
    above.sort_by(by_strength_then_position);

    // Strongest first: anything close to an accepted hit of the same version merges into it
    let mut accepted: Vec<Candidate> = Vec::new();
    for hit in above {
        let merged = accepted.iter().any(|c| {
            c.version == hit.version && c.start_sample.abs_diff(hit.start_sample) < min_separation
        });
        if merged {
            continue;
        }
        if hit.strength < threshold * AMBIGUITY_FACTOR {
            let Some(spec) = specs.iter().find(|s| s.version == hit.version) else {
                continue;
            };
            let segment = &samples[hit.start_sample..hit.start_sample + window];
            if vote(segment, spec.end_marker_hz, spec.start_marker_hz, sample_rate) == Some(Bit::Zero) {
                log::trace!(
                    "Discarding ambiguous version {} hit at sample {}: end marker dominates",
                    hit.version,
                    hit.start_sample
                );
                continue;
            }
        }
        accepted.push(hit);
    }

    let max_strength = state.max_strength;
    for candidate in accepted.iter_mut() {
        candidate.confidence = if max_strength > 0.0 {
            (candidate.strength / max_strength).min(1.0)
        } else {
            0.0
        };
    }
    accepted.truncate(params.max_candidates);

    log::debug!(
        "Scanned {} windows: max marker strength {:.6}, noise floor {:.6}, threshold {:.6}, {} candidate(s)",
        windows,
        max_strength,
        state.noise_floor(),
        threshold,
        accepted.len()
    );

    Ok(ScanReport {
        candidates: accepted,
        max_strength,
        noise_floor: state.noise_floor(),
        threshold,
        windows,
    })
}

/// Locate the local maximum of start-marker energy around a coarse position
///
/// Returns the refined start sample and the marker strength measured there.
pub fn refine_alignment(samples: &[f32], sample_rate: u32, spec: &VersionSpec, coarse_start: usize) -> (usize, f32) {
    let window = spec.marker_samples(sample_rate);
    if window == 0 || samples.len() < window {
        return (coarse_start, 0.0);
    }
    let last = samples.len() - window;

    let to_samples = |ms: f32| ((ms * sample_rate as f32 / 1000.0).round() as usize).max(1);
    let measure = |pos: usize| strength(&samples[pos..pos + window], spec.start_marker_hz, sample_rate);

    let search = |center: usize, span: usize, step: usize| -> (usize, f32) {
        let lo = center.saturating_sub(span);
        let hi = (center + span).min(last);
        let mut best = (center.min(last), measure(center.min(last)));
        let mut pos = lo;
        while pos <= hi {
            let value = measure(pos);
            if value > best.1 {
                best = (pos, value);
            }
            pos += step;
        }
        best
    };

    let (coarse_best, _) = search(
        coarse_start,
        to_samples(COARSE_ALIGN_SPAN_MS),
        to_samples(COARSE_ALIGN_STEP_MS),
    );
    search(coarse_best, to_samples(FINE_ALIGN_SPAN_MS), to_samples(FINE_ALIGN_STEP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::spec_for;
    use crate::tone::tone_samples;

    const RATE: u32 = 44100;

    fn params() -> ScanParams {
        ScanParams {
            window_ms: 100,
            hop_ms: 50,
            threshold_fraction: 0.5,
            absolute_floor: 0.002,
            min_separation_secs: 0.8,
            max_candidates: 5,
        }
    }

    fn place(buffer: &mut [f32], at: usize, samples: &[f32]) {
        for (i, &s) in samples.iter().enumerate() {
            buffer[at + i] += s;
        }
    }

    #[test]
    fn test_scan_finds_marker() {
        let spec = spec_for(1).unwrap();
        let mut buffer = vec![0.0; RATE as usize * 3];
        let marker = tone_samples(spec.start_marker_hz, spec.marker_samples(RATE), 0.05, RATE);
        place(&mut buffer, 30000, &marker);

        let report = scan_markers(&buffer, RATE, &[spec], &params(), &Budget::unlimited()).unwrap();
        assert_eq!(report.candidates.len(), 1);
        let c = report.candidates[0];
        assert_eq!(c.version, 1);
        assert!(c.start_sample.abs_diff(30000) <= 2205);
        assert_eq!(c.confidence, 1.0);
    }

    #[test]
    fn test_scan_identifies_version_by_marker() {
        let specs: Vec<&VersionSpec> = (1..=5).map(|v| spec_for(v).unwrap()).collect();
        let spec3 = spec_for(3).unwrap();
        let mut buffer = vec![0.0; RATE as usize * 2];
        let marker = tone_samples(spec3.start_marker_hz, spec3.marker_samples(RATE), 0.05, RATE);
        place(&mut buffer, 20000, &marker);

        let report = scan_markers(&buffer, RATE, &specs, &params(), &Budget::unlimited()).unwrap();
        assert!(!report.candidates.is_empty());
        assert!(report.candidates.iter().all(|c| c.version == 3));
    }

    #[test]
    fn test_scan_merges_nearby_hits() {
        let spec = spec_for(1).unwrap();
        let mut buffer = vec![0.0; RATE as usize * 6];
        let marker = tone_samples(spec.start_marker_hz, spec.marker_samples(RATE), 0.05, RATE);
        place(&mut buffer, 10000, &marker);
        place(&mut buffer, 10000 + RATE as usize * 3, &marker);

        let report = scan_markers(&buffer, RATE, &[spec], &params(), &Budget::unlimited()).unwrap();
        assert_eq!(report.candidates.len(), 2);
        let mut starts: Vec<usize> = report.candidates.iter().map(|c| c.start_sample).collect();
        starts.sort();
        assert!(starts[1] - starts[0] > RATE as usize * 2);
    }

    #[test]
    fn test_scan_silence_has_no_candidates() {
        let spec = spec_for(1).unwrap();
        let buffer = vec![0.0; RATE as usize * 2];
        let report = scan_markers(&buffer, RATE, &[spec], &params(), &Budget::unlimited()).unwrap();
        assert!(report.candidates.is_empty());
        assert_eq!(report.max_strength, 0.0);
        assert_eq!(report.threshold, 0.002);
    }

    #[test]
    fn test_scan_short_buffer() {
        let spec = spec_for(1).unwrap();
        let report = scan_markers(&[0.0; 10], RATE, &[spec], &params(), &Budget::unlimited()).unwrap();
        assert_eq!(report.windows, 0);
    }

    #[test]
    fn test_scan_respects_budget() {
        let spec = spec_for(1).unwrap();
        let buffer = vec![0.0; RATE as usize * 2];
        let budget = Budget::new(Some(std::time::Duration::ZERO));
        assert!(matches!(
            scan_markers(&buffer, RATE, &[spec], &params(), &budget),
            Err(crate::error::TonemarkError::Timeout { candidates_found: 0, .. })
        ));
    }

    #[test]
    fn test_provisional_candidates_use_running_threshold() {
        let mut state = ScanState::default();
        assert_eq!(state.provisional_candidates(&params()), 0);

        state.record(1, 0, 0.0001);
        state.record(1, 2205, 0.0015);
        // Below the absolute floor, nothing counts yet
        assert_eq!(state.provisional_candidates(&params()), 0);

        state.record(1, 4410, 0.01);
        state.record(2, 4410, 0.004);
        state.record(1, 6615, 0.006);
        assert_eq!(state.provisional_candidates(&params()), 2);
    }

    #[test]
    fn test_refine_alignment_recovers_exact_start() {
        let spec = spec_for(1).unwrap();
        let mut buffer = vec![0.0; RATE as usize * 2];
        let marker = tone_samples(spec.start_marker_hz, spec.marker_samples(RATE), 0.05, RATE);
        place(&mut buffer, 31234, &marker);

        let (start, value) = refine_alignment(&buffer, RATE, spec, 30000);
        assert!(start.abs_diff(31234) <= 11, "refined to {}", start);
        assert!(value > 0.02);
    }
}
