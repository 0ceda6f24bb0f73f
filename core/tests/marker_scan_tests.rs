use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tonemark_core::budget::Budget;
use tonemark_core::demod::confirm_end_boundary;
use tonemark_core::probe::{vote, Bit};
use tonemark_core::scan::{refine_alignment, scan_markers, ScanParams};
use tonemark_core::tone::tone_samples;
use tonemark_core::{spec_for_band, Band, DecoderConfig, VersionSpec};

const RATE: u32 = 44100;

fn noise(len: usize, sigma: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, sigma).unwrap();
    (0..len).map(|_| normal.sample(&mut rng)).collect()
}

fn add_tone(buffer: &mut [f32], at: usize, frequency: f32, len: usize, amplitude: f32) {
    for (i, s) in tone_samples(frequency, len, amplitude, RATE).into_iter().enumerate() {
        buffer[at + i] += s;
    }
}

fn scan_params() -> ScanParams {
    DecoderConfig::default().scan
}

fn band_specs(band: Band) -> Vec<&'static VersionSpec> {
    band.specs().iter().collect()
}

#[test]
fn test_every_version_marker_found_in_noise() {
    let specs = band_specs(Band::Mobile);
    for spec in &specs {
        let mut buffer = noise(RATE as usize * 3, 0.05, spec.version as u64);
        let at = 40_000;
        add_tone(&mut buffer, at, spec.start_marker_hz, spec.marker_samples(RATE), 0.05);

        let report = scan_markers(&buffer, RATE, &specs, &scan_params(), &Budget::unlimited()).unwrap();
        let best = report.candidates.first().expect("marker not found");
        assert_eq!(best.version, spec.version);
        assert!(best.start_sample.abs_diff(at) <= 2205, "version {} at {}", spec.version, best.start_sample);

        let (aligned, _) = refine_alignment(&buffer, RATE, spec, best.start_sample);
        assert!(aligned.abs_diff(at) <= 22, "version {} aligned to {}", spec.version, aligned);
    }
}

#[test]
fn test_ultrasonic_markers_found_at_48k() {
    let rate = 48000;
    let specs = band_specs(Band::Ultrasonic);
    let spec = spec_for_band(Band::Ultrasonic, 4).unwrap();
    let mut buffer = vec![0.0; rate as usize * 2];
    let marker = tone_samples(spec.start_marker_hz, spec.marker_samples(rate), 0.05, rate);
    buffer[24_000..24_000 + marker.len()].copy_from_slice(&marker);

    let report = scan_markers(&buffer, rate, &specs, &scan_params(), &Budget::unlimited()).unwrap();
    assert!(!report.candidates.is_empty());
    assert!(report.candidates.iter().all(|c| c.version == 4));
}

#[test]
fn test_quiet_noise_yields_no_candidates() {
    let specs = band_specs(Band::Mobile);
    let buffer = noise(RATE as usize * 5, 0.01, 99);
    let report = scan_markers(&buffer, RATE, &specs, &scan_params(), &Budget::unlimited()).unwrap();
    assert!(report.candidates.is_empty(), "{:?}", report.candidates);
    assert!(report.max_strength < report.threshold);
    assert!(report.noise_floor > 0.0);
}

#[test]
fn test_candidates_ranked_by_strength() {
    let spec = spec_for_band(Band::Mobile, 1).unwrap();
    let mut buffer = vec![0.0; RATE as usize * 6];
    let len = spec.marker_samples(RATE);
    add_tone(&mut buffer, 22_050, spec.start_marker_hz, len, 0.03);
    add_tone(&mut buffer, 22_050 * 5, spec.start_marker_hz, len, 0.05);
    add_tone(&mut buffer, 22_050 * 9, spec.start_marker_hz, len, 0.04);

    let report = scan_markers(&buffer, RATE, &[spec], &scan_params(), &Budget::unlimited()).unwrap();
    let starts: Vec<usize> = report.candidates.iter().map(|c| c.start_sample).collect();
    assert_eq!(starts, vec![22_050 * 5, 22_050 * 9, 22_050]);
    assert!(report.candidates.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn test_candidate_cap() {
    let spec = spec_for_band(Band::Mobile, 1).unwrap();
    let mut buffer = vec![0.0; RATE as usize * 10];
    for i in 0..8 {
        add_tone(&mut buffer, i * RATE as usize, spec.start_marker_hz, spec.marker_samples(RATE), 0.05);
    }
    let report = scan_markers(&buffer, RATE, &[spec], &scan_params(), &Budget::unlimited()).unwrap();
    assert_eq!(report.candidates.len(), 5);
}

#[test]
fn test_ambiguous_hit_dominated_by_end_marker_is_dropped() {
    let spec = spec_for_band(Band::Mobile, 1).unwrap();
    let len = spec.marker_samples(RATE);
    let mut buffer = vec![0.0; RATE as usize * 5];

    // Clear start marker sets the threshold
    add_tone(&mut buffer, RATE as usize * 3, spec.start_marker_hz, len, 0.04);
    // Weak start tone buried under a loud end marker
    add_tone(&mut buffer, RATE as usize, spec.start_marker_hz, len, 0.025);
    add_tone(&mut buffer, RATE as usize, spec.end_marker_hz, len, 0.1);

    let report = scan_markers(&buffer, RATE, &[spec], &scan_params(), &Budget::unlimited()).unwrap();
    assert_eq!(report.candidates.len(), 1, "{:?}", report.candidates);
    assert_eq!(report.candidates[0].start_sample, RATE as usize * 3);
}

#[test]
fn test_boundary_vote_distinguishes_markers() {
    let spec = spec_for_band(Band::Mobile, 2).unwrap();
    let len = spec.marker_samples(RATE);

    let end = tone_samples(spec.end_marker_hz, len, 0.05, RATE);
    assert_eq!(vote(&end, spec.start_marker_hz, spec.end_marker_hz, RATE), Some(Bit::One));

    let start = tone_samples(spec.start_marker_hz, len, 0.05, RATE);
    assert_eq!(vote(&start, spec.start_marker_hz, spec.end_marker_hz, RATE), Some(Bit::Zero));
}

#[test]
fn test_end_boundary_requires_end_marker() {
    let spec = spec_for_band(Band::Mobile, 1).unwrap();
    let len = spec.marker_samples(RATE);
    let end_at = len + spec.data_samples(RATE);
    let mut buffer = vec![0.0; end_at + len + 1000];

    assert!(!confirm_end_boundary(&buffer, RATE, spec, 0));
    add_tone(&mut buffer, end_at, spec.end_marker_hz, len, 0.05);
    assert!(confirm_end_boundary(&buffer, RATE, spec, 0));
    // Boundary slot past the buffer end
    assert!(!confirm_end_boundary(&buffer[..end_at + 10], RATE, spec, 0));
}
