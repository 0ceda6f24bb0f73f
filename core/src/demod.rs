use crate::budget::Budget;
use crate::chunking::unpack_column;
use crate::error::{Result, TonemarkError};
use crate::matrix::BitMatrix;
use crate::plan::VersionSpec;
use crate::probe::{grid_argmax, vote, Bit};
use crate::EDGE_MARGIN;
use std::collections::HashMap;

/// One demodulated cycle, before the matrix codec sees it
#[derive(Debug, Clone)]
pub struct CycleReading {
    pub version: u8,
    pub start_sample: usize,
    pub confidence: f32,
    /// Chunk per slot in transmission order; None where the slot ran past the buffer
    pub slots: Vec<Option<u8>>,
    pub matrix: BitMatrix,
    /// Columns with a missing slot or bad padding
    pub corrupted_columns: Vec<usize>,
    pub boundary_confirmed: bool,
}

impl CycleReading {
    pub fn corruption_rate(&self) -> f32 {
        if self.matrix.size() == 0 {
            return 1.0;
        }
        self.corrupted_columns.len() as f32 / self.matrix.size() as f32
    }

    /// Reject readings whose share of corrupted columns exceeds `ceiling`
    pub fn validate(&self, ceiling: f32) -> Result<()> {
        if self.corruption_rate() > ceiling {
            return Err(TonemarkError::CycleCorrupted {
                corrupted_columns: self.corrupted_columns.len(),
                total_columns: self.matrix.size(),
            });
        }
        Ok(())
    }
}

/// Read every chunk slot of a cycle whose start marker begins at `start_sample`
///
/// `candidates_found` is reported in the `Timeout` error if the budget runs out.
pub fn demodulate_cycle(
    samples: &[f32],
    sample_rate: u32,
    spec: &VersionSpec,
    start_sample: usize,
    confidence: f32,
    budget: &Budget,
    candidates_found: usize,
) -> Result<CycleReading> {
    let marker_len = spec.marker_samples(sample_rate);
    let chunk_len = spec.chunk_samples(sample_rate);
    let margin = (chunk_len as f32 * EDGE_MARGIN) as usize;
    let data_start = start_sample + marker_len;

    let mut slots = Vec::with_capacity(spec.total_chunks());
    for col in 0..spec.matrix_size {
        budget.check(candidates_found)?;
        for row_chunk in 0..spec.chunks_per_column {
            let slot_start = data_start + (col * spec.chunks_per_column + row_chunk) * chunk_len;
            let lo = slot_start + margin;
            let hi = slot_start + chunk_len - margin;
            let reading = if hi <= samples.len() && lo < hi {
                Some(grid_argmax(&samples[lo..hi], spec, sample_rate).chunk)
            } else {
                None
            };
            slots.push(reading);
        }
    }

    let (matrix, corrupted_columns) = assemble(&slots, spec);
    let boundary_confirmed = confirm_end_boundary(samples, sample_rate, spec, start_sample);

    log::debug!(
        "Version {} cycle at sample {}: {}/{} columns corrupted, end boundary {}",
        spec.version,
        start_sample,
        corrupted_columns.len(),
        spec.matrix_size,
        if boundary_confirmed { "confirmed" } else { "unconfirmed" }
    );

    Ok(CycleReading {
        version: spec.version,
        start_sample,
        confidence,
        slots,
        matrix,
        corrupted_columns,
        boundary_confirmed,
    })
}

/// Rebuild the matrix from slot readings
///
/// Missing slots and a last chunk with non-zero padding are zero-filled; the
/// rest of the column keeps its demodulated bits. Either defect marks the
/// column as corrupted.
pub fn assemble(slots: &[Option<u8>], spec: &VersionSpec) -> (BitMatrix, Vec<usize>) {
    let mut matrix = BitMatrix::new(spec.matrix_size);
    let mut corrupted = Vec::new();
    let tail_start = (spec.chunks_per_column - 1) * spec.chunk_bits;

    for col in 0..spec.matrix_size {
        let from = col * spec.chunks_per_column;
        let group: Vec<Option<u8>> = (from..from + spec.chunks_per_column)
            .map(|slot| slots.get(slot).copied().flatten())
            .collect();
        let complete = group.iter().all(Option::is_some);
        let chunks: Vec<u8> = group.iter().map(|chunk| chunk.unwrap_or(0)).collect();

        let mut unpacked = unpack_column(&chunks, spec.chunk_bits, spec.matrix_size);
        if !unpacked.padding_ok {
            unpacked.bits.iter_mut().skip(tail_start).for_each(|bit| *bit = false);
        }
        matrix.set_column(col, &unpacked.bits);
        if !complete || !unpacked.padding_ok {
            corrupted.push(col);
        }
    }

    (matrix, corrupted)
}

/// True when the detector ensemble hears the end marker where it should be
pub fn confirm_end_boundary(samples: &[f32], sample_rate: u32, spec: &VersionSpec, start_sample: usize) -> bool {
    let marker_len = spec.marker_samples(sample_rate);
    let end_start = start_sample + marker_len + spec.data_samples(sample_rate);
    if end_start + marker_len > samples.len() {
        return false;
    }
    let segment = &samples[end_start..end_start + marker_len];
    vote(segment, spec.start_marker_hz, spec.end_marker_hz, sample_rate) == Some(Bit::One)
}

/// Slot-wise plurality over several readings of the same version
///
/// Ties go to the value seen first, so readings should be passed best first.
pub fn merge_slots(readings: &[&CycleReading]) -> Vec<Option<u8>> {
    let slot_count = readings.iter().map(|r| r.slots.len()).max().unwrap_or(0);

    (0..slot_count)
        .map(|slot| {
            let mut counts: HashMap<u8, (usize, usize)> = HashMap::new();
            for (order, reading) in readings.iter().enumerate() {
                if let Some(Some(chunk)) = reading.slots.get(slot) {
                    counts.entry(*chunk).or_insert((0, order)).0 += 1;
                }
            }
            counts
                .into_iter()
                .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
                .map(|(chunk, _)| chunk)
        })
        .collect()
}
