use crate::error::{Result, TonemarkError};

/// Square grid of modules, `true` is a dark module
///
/// Stored row-major; the modem reads and writes it one column at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    size: usize,
    bits: Vec<bool>,
}

impl BitMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            bits: vec![false; size * size],
        }
    }

    /// Build a matrix from rows; every row must be as long as there are rows
    pub fn from_rows(rows: &[Vec<bool>]) -> Result<Self> {
        let size = rows.len();
        if rows.iter().any(|row| row.len() != size) {
            return Err(TonemarkError::InvalidInput("bit matrix must be square".to_string()));
        }
        Ok(Self {
            size,
            bits: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn get(&self, row: usize, col: usize) -> bool {
        self.bits[row * self.size + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: bool) {
        self.bits[row * self.size + col] = value;
    }

    /// Column bits, top to bottom
    pub fn column(&self, col: usize) -> Vec<bool> {
        (0..self.size).map(|row| self.get(row, col)).collect()
    }

    pub fn set_column(&mut self, col: usize, bits: &[bool]) {
        for (row, &bit) in bits.iter().take(self.size).enumerate() {
            self.set(row, col, bit);
        }
    }

    pub fn dark_modules(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Fraction of modules that agree with another matrix of the same size
    pub fn agreement(&self, other: &BitMatrix) -> f32 {
        if self.size != other.size || self.bits.is_empty() {
            return 0.0;
        }
        let same = self
            .bits
            .iter()
            .zip(other.bits.iter())
            .filter(|(a, b)| a == b)
            .count();
        same as f32 / self.bits.len() as f32
    }
}

impl std::fmt::Display for BitMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in 0..self.size {
            for col in 0..self.size {
                f.write_str(if self.get(row, col) { "##" } else { "  " })?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_access() {
        let mut m = BitMatrix::new(3);
        m.set(0, 1, true);
        m.set(2, 1, true);
        assert_eq!(m.column(1), vec![true, false, true]);
        assert_eq!(m.column(0), vec![false, false, false]);
        assert_eq!(m.dark_modules(), 2);
    }

    #[test]
    fn test_set_column_truncates() {
        let mut m = BitMatrix::new(2);
        m.set_column(1, &[true, true, true, true]);
        assert!(m.get(0, 1));
        assert!(m.get(1, 1));
        assert!(!m.get(0, 0));
    }

    #[test]
    fn test_from_rows_requires_square() {
        let rows = vec![vec![true, false], vec![false]];
        assert!(BitMatrix::from_rows(&rows).is_err());

        let rows = vec![vec![true, false], vec![false, true]];
        let m = BitMatrix::from_rows(&rows).unwrap();
        assert!(m.get(0, 0) && m.get(1, 1));
    }

    #[test]
    fn test_agreement() {
        let a = BitMatrix::new(2);
        let mut b = BitMatrix::new(2);
        assert_eq!(a.agreement(&b), 1.0);
        b.set(0, 0, true);
        assert_eq!(a.agreement(&b), 0.75);
        assert_eq!(a.agreement(&BitMatrix::new(3)), 0.0);
    }
}
