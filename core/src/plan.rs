use crate::error::{Result, TonemarkError};
use crate::{
    CHUNK_BITS, DATA_GRID_BINS, DATA_GRID_STEP_HZ, DETECTION_TOLERANCE_HZ, MAX_VERSION,
    MIN_VERSION, NYQUIST_GUARD_HZ,
};

// Frequency plan
//
// Two presets share one table layout:
// - Mobile: data grid 14000-15890 Hz, markers 16200-17100 Hz (44.1/48 kHz capture)
// - Ultrasonic: data grid 21000-22890 Hz, markers 23000-23540 Hz (48 kHz and up)
//
// Every version owns a distinct start/end marker pair so a scan can tell the
// matrix size from the marker alone.

/// Frequency band preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Band {
    #[default]
    Mobile,
    Ultrasonic,
}

impl Band {
    pub const ALL: [Band; 2] = [Band::Mobile, Band::Ultrasonic];

    pub fn name(&self) -> &'static str {
        match self {
            Band::Mobile => "mobile",
            Band::Ultrasonic => "ultrasonic",
        }
    }

    /// Version specs of this band, version 1 first
    pub fn specs(&self) -> &'static [VersionSpec; 5] {
        match self {
            Band::Mobile => &MOBILE_SPECS,
            Band::Ultrasonic => &ULTRASONIC_SPECS,
        }
    }
}

impl std::str::FromStr for Band {
    type Err = TonemarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(Band::Mobile),
            "ultrasonic" => Ok(Band::Ultrasonic),
            other => Err(TonemarkError::InvalidInput(format!("unknown band '{}'", other))),
        }
    }
}

/// Immutable protocol parameters for one matrix version in one band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VersionSpec {
    pub version: u8,
    pub band: Band,
    pub matrix_size: usize,
    pub chunk_bits: usize,
    pub chunks_per_column: usize,
    pub start_marker_hz: f32,
    pub end_marker_hz: f32,
    pub data_grid_base_hz: f32,
    pub data_grid_step_hz: f32,
    pub data_grid_bins: usize,
    pub chunk_duration_ms: u32,
    pub marker_duration_ms: u32,
    pub gap_duration_ms: u32,
}

const MARKER_DURATION_MS: u32 = 100;
const GAP_DURATION_MS: u32 = 300;

const fn make_spec(
    band: Band,
    version: u8,
    start_marker_hz: f32,
    end_marker_hz: f32,
    data_grid_base_hz: f32,
    chunk_duration_ms: u32,
) -> VersionSpec {
    let matrix_size = 17 + 4 * version as usize;
    VersionSpec {
        version,
        band,
        matrix_size,
        chunk_bits: CHUNK_BITS,
        chunks_per_column: (matrix_size + CHUNK_BITS - 1) / CHUNK_BITS,
        start_marker_hz,
        end_marker_hz,
        data_grid_base_hz,
        data_grid_step_hz: DATA_GRID_STEP_HZ,
        data_grid_bins: DATA_GRID_BINS,
        chunk_duration_ms,
        marker_duration_ms: MARKER_DURATION_MS,
        gap_duration_ms: GAP_DURATION_MS,
    }
}

static MOBILE_SPECS: [VersionSpec; 5] = [
    make_spec(Band::Mobile, 1, 16200.0, 16300.0, 14000.0, 100),
    make_spec(Band::Mobile, 2, 16400.0, 16500.0, 14000.0, 90),
    make_spec(Band::Mobile, 3, 16600.0, 16700.0, 14000.0, 80),
    make_spec(Band::Mobile, 4, 16800.0, 16900.0, 14000.0, 70),
    make_spec(Band::Mobile, 5, 17000.0, 17100.0, 14000.0, 60),
];

static ULTRASONIC_SPECS: [VersionSpec; 5] = [
    make_spec(Band::Ultrasonic, 1, 23000.0, 23060.0, 21000.0, 100),
    make_spec(Band::Ultrasonic, 2, 23120.0, 23180.0, 21000.0, 90),
    make_spec(Band::Ultrasonic, 3, 23240.0, 23300.0, 21000.0, 80),
    make_spec(Band::Ultrasonic, 4, 23360.0, 23420.0, 21000.0, 70),
    make_spec(Band::Ultrasonic, 5, 23480.0, 23540.0, 21000.0, 60),
];

/// Look up a mobile-band version spec
pub fn spec_for(version: u8) -> Result<&'static VersionSpec> {
    spec_for_band(Band::Mobile, version)
}

pub fn spec_for_band(band: Band, version: u8) -> Result<&'static VersionSpec> {
    if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
        return Err(TonemarkError::UnsupportedVersion(version));
    }
    Ok(&band.specs()[(version - MIN_VERSION) as usize])
}

/// Map a chunk value onto its grid frequency
pub fn chunk_to_frequency(chunk: u8, spec: &VersionSpec) -> f32 {
    spec.data_grid_base_hz + chunk as f32 * spec.data_grid_step_hz
}

/// Nearest grid point for a frequency, or None when it is off-grid by more
/// than the detection tolerance
pub fn frequency_to_chunk(frequency: f32, spec: &VersionSpec) -> Option<u8> {
    let offset = (frequency - spec.data_grid_base_hz) / spec.data_grid_step_hz;
    let nearest = offset.round();
    if nearest < 0.0 || nearest >= spec.data_grid_bins as f32 {
        return None;
    }
    let snapped = spec.data_grid_base_hz + nearest * spec.data_grid_step_hz;
    if (frequency - snapped).abs() > DETECTION_TOLERANCE_HZ {
        return None;
    }
    Some(nearest as u8)
}

/// Convert a millisecond duration into the sample count both sides agree on
pub fn ms_to_samples(ms: u32, sample_rate: u32) -> usize {
    (sample_rate as u64 * ms as u64 / 1000) as usize
}

impl VersionSpec {
    pub fn total_chunks(&self) -> usize {
        self.matrix_size * self.chunks_per_column
    }

    pub fn padding_bits(&self) -> usize {
        self.chunks_per_column * self.chunk_bits - self.matrix_size
    }

    pub fn marker_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.marker_duration_ms, sample_rate)
    }

    pub fn chunk_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.chunk_duration_ms, sample_rate)
    }

    pub fn gap_samples(&self, sample_rate: u32) -> usize {
        ms_to_samples(self.gap_duration_ms, sample_rate)
    }

    /// Samples from the first marker sample to the first data sample after it
    pub fn data_samples(&self, sample_rate: u32) -> usize {
        self.total_chunks() * self.chunk_samples(sample_rate)
    }

    /// Full cycle length including the trailing gap
    pub fn cycle_samples(&self, sample_rate: u32) -> usize {
        2 * self.marker_samples(sample_rate)
            + self.data_samples(sample_rate)
            + self.gap_samples(sample_rate)
    }

    pub fn cycle_seconds(&self, sample_rate: u32) -> f32 {
        self.cycle_samples(sample_rate) as f32 / sample_rate as f32
    }

    pub fn max_frequency(&self) -> f32 {
        let grid_top = chunk_to_frequency((self.data_grid_bins - 1) as u8, self);
        grid_top.max(self.start_marker_hz).max(self.end_marker_hz)
    }
}

/// Reject sample rates that cannot represent every tone of this version
pub fn check_sample_rate(spec: &VersionSpec, sample_rate: u32) -> Result<()> {
    let limit = sample_rate as f32 / 2.0 - NYQUIST_GUARD_HZ;
    if sample_rate == 0 || spec.max_frequency() >= limit {
        return Err(TonemarkError::InvalidInput(format!(
            "sample rate {} Hz cannot carry the {} band (needs Nyquist above {} Hz)",
            sample_rate,
            spec.band.name(),
            spec.max_frequency() + NYQUIST_GUARD_HZ
        )));
    }
    Ok(())
}

/// Smallest common sample rate that carries every version of the band
pub fn min_sample_rate(band: Band) -> u32 {
    let top = band
        .specs()
        .iter()
        .map(|s| s.max_frequency())
        .fold(0.0f32, f32::max);
    ((top + NYQUIST_GUARD_HZ) * 2.0).ceil() as u32 + 1
}

/// Longest cycle of the band, used to size rolling buffers
pub fn longest_cycle_samples(band: Band, sample_rate: u32) -> usize {
    band.specs()
        .iter()
        .map(|s| s.cycle_samples(sample_rate))
        .max()
        .unwrap_or(0)
}
