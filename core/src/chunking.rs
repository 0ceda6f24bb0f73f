use crate::matrix::BitMatrix;
use crate::plan::VersionSpec;

// Column chunk packing
//
// A column is read top to bottom, zero-padded to a multiple of chunk_bits and
// cut into chunks. Within a chunk the first (upper) bit is the most
// significant one. Encoder and decoder both go through this file so the order
// cannot drift between them.

/// Pack column bits into chunk values, MSB first
pub fn pack_column(bits: &[bool], chunk_bits: usize, chunks_per_column: usize) -> Vec<u8> {
    (0..chunks_per_column)
        .map(|chunk_idx| {
            let mut value = 0u8;
            for bit_idx in 0..chunk_bits {
                let row = chunk_idx * chunk_bits + bit_idx;
                let bit = bits.get(row).copied().unwrap_or(false);
                value = (value << 1) | bit as u8;
            }
            value
        })
        .collect()
}

/// Result of unpacking one column's chunks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedColumn {
    pub bits: Vec<bool>,
    /// True when every padding bit past the matrix edge was zero
    pub padding_ok: bool,
}

/// Rebuild a column from its chunk values and check the padding tail
pub fn unpack_column(chunks: &[u8], chunk_bits: usize, rows: usize) -> UnpackedColumn {
    let mut all_bits = Vec::with_capacity(chunks.len() * chunk_bits);
    for &chunk in chunks {
        for bit_idx in (0..chunk_bits).rev() {
            all_bits.push((chunk >> bit_idx) & 1 == 1);
        }
    }

    let padding_ok = all_bits.iter().skip(rows).all(|&b| !b) && all_bits.len() >= rows;
    all_bits.truncate(rows);

    UnpackedColumn {
        bits: all_bits,
        padding_ok,
    }
}

/// Full chunk sequence of a matrix, column by column
pub fn matrix_chunks(matrix: &BitMatrix, spec: &VersionSpec) -> Vec<u8> {
    (0..matrix.size())
        .flat_map(|col| pack_column(&matrix.column(col), spec.chunk_bits, spec.chunks_per_column))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::spec_for;

    #[test]
    fn test_pack_msb_first() {
        // Top row is bit 5 of the first chunk
        let mut bits = vec![false; 21];
        bits[0] = true;
        bits[5] = true;
        bits[6] = true;
        let chunks = pack_column(&bits, 6, 4);
        assert_eq!(chunks, vec![0b100001, 0b100000, 0, 0]);
    }

    #[test]
    fn test_pack_zero_pads_tail() {
        let bits = vec![true; 21];
        let chunks = pack_column(&bits, 6, 4);
        // Rows 18..21 fill the top three bits of the last chunk
        assert_eq!(chunks, vec![63, 63, 63, 0b111000]);
    }

    #[test]
    fn test_unpack_matches_pack() {
        let bits: Vec<bool> = (0..25).map(|i| i % 3 == 0).collect();
        let chunks = pack_column(&bits, 6, 5);
        let column = unpack_column(&chunks, 6, 25);
        assert_eq!(column.bits, bits);
        assert!(column.padding_ok);
    }

    #[test]
    fn test_unpack_flags_bad_padding() {
        let column = unpack_column(&[63, 63, 63, 0b111001], 6, 21);
        assert!(!column.padding_ok);
        assert_eq!(column.bits.len(), 21);
    }

    #[test]
    fn test_unpack_short_input_is_invalid() {
        let column = unpack_column(&[63], 6, 21);
        assert!(!column.padding_ok);
    }

    #[test]
    fn test_matrix_chunks_column_major() {
        let spec = spec_for(1).unwrap();
        let mut matrix = BitMatrix::new(21);
        matrix.set(0, 1, true);
        let chunks = matrix_chunks(&matrix, spec);
        assert_eq!(chunks.len(), spec.total_chunks());
        // Column 0 is all zero, column 1 starts with the set bit
        assert!(chunks[..4].iter().all(|&c| c == 0));
        assert_eq!(chunks[4], 0b100000);
    }
}
