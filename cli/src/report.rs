use serde::{Deserialize, Serialize};
use tonemark_core::{Band, DecodeOutcome, VersionSpec};

/// JSON view of a successful decode
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecodeReport {
    pub text: String,
    pub version: u8,
    pub confidence: f32,
    pub candidates_examined: usize,
    pub start_seconds: f32,
    pub corrupted_columns: Vec<usize>,
    pub boundary_confirmed: bool,
    pub recovery: String,
}

impl From<&DecodeOutcome> for DecodeReport {
    fn from(outcome: &DecodeOutcome) -> Self {
        Self {
            text: outcome.text.clone(),
            version: outcome.version,
            confidence: outcome.confidence,
            candidates_examined: outcome.candidates_examined,
            start_seconds: outcome.start_seconds,
            corrupted_columns: outcome.corrupted_columns.clone(),
            boundary_confirmed: outcome.boundary_confirmed,
            recovery: outcome.recovery.name().to_string(),
        }
    }
}

/// One row of the frequency plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionInfo {
    pub band: String,
    pub version: u8,
    pub matrix_size: usize,
    pub chunks_per_column: usize,
    pub start_marker_hz: f32,
    pub end_marker_hz: f32,
    pub grid_base_hz: f32,
    pub grid_top_hz: f32,
    pub chunk_ms: u32,
    pub cycle_seconds: f32,
}

impl VersionInfo {
    pub fn new(spec: &VersionSpec, sample_rate: u32) -> Self {
        Self {
            band: spec.band.name().to_string(),
            version: spec.version,
            matrix_size: spec.matrix_size,
            chunks_per_column: spec.chunks_per_column,
            start_marker_hz: spec.start_marker_hz,
            end_marker_hz: spec.end_marker_hz,
            grid_base_hz: spec.data_grid_base_hz,
            grid_top_hz: spec.data_grid_base_hz + (spec.data_grid_bins - 1) as f32 * spec.data_grid_step_hz,
            chunk_ms: spec.chunk_duration_ms,
            cycle_seconds: spec.cycle_seconds(sample_rate),
        }
    }
}

pub fn version_table(bands: &[Band], sample_rate: u32) -> Vec<VersionInfo> {
    bands
        .iter()
        .flat_map(|band| band.specs().iter())
        .map(|spec| VersionInfo::new(spec, sample_rate))
        .collect()
}
