use crate::error::{Result, TonemarkError};
use crate::matrix::BitMatrix;
use crate::plan::spec_for;
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode, Version};

/// Translation between text payloads and bit matrices
///
/// The modem never interprets matrix contents; any implementation that turns
/// text into a square matrix of the version's size and back can be plugged in.
pub trait MatrixCodec {
    fn encode_text(&self, text: &str, version: u8) -> Result<BitMatrix>;

    /// Returns None when the matrix cannot be read (error correction exhausted)
    fn decode_matrix(&self, matrix: &BitMatrix) -> Option<String>;
}

/// QR error correction level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorCorrection {
    Low,
    #[default]
    Medium,
    Quartile,
    High,
}

impl From<ErrorCorrection> for EcLevel {
    fn from(level: ErrorCorrection) -> Self {
        match level {
            ErrorCorrection::Low => EcLevel::L,
            ErrorCorrection::Medium => EcLevel::M,
            ErrorCorrection::Quartile => EcLevel::Q,
            ErrorCorrection::High => EcLevel::H,
        }
    }
}

impl std::str::FromStr for ErrorCorrection {
    type Err = TonemarkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(ErrorCorrection::Low),
            "m" | "medium" => Ok(ErrorCorrection::Medium),
            "q" | "quartile" => Ok(ErrorCorrection::Quartile),
            "h" | "high" => Ok(ErrorCorrection::High),
            other => Err(TonemarkError::InvalidInput(format!(
                "unknown error correction level '{}'",
                other
            ))),
        }
    }
}

/// Pixels per module when rasterising a matrix for the reader
const DEFAULT_MODULE_PX: usize = 4;

/// Quiet-zone width in modules
const DEFAULT_QUIET_ZONE: usize = 4;

/// QR codec backed by `qrcode` (encode) and `rqrr` (decode)
///
/// Decoding rasterises the matrix into a high-contrast greyscale image with a
/// quiet zone and runs a regular 2D reader on it, so the reader's own error
/// correction applies.
#[derive(Debug, Clone)]
pub struct QrCodec {
    ec_level: ErrorCorrection,
    module_px: usize,
    quiet_zone: usize,
}

impl QrCodec {
    pub fn new(ec_level: ErrorCorrection) -> Self {
        Self {
            ec_level,
            module_px: DEFAULT_MODULE_PX,
            quiet_zone: DEFAULT_QUIET_ZONE,
        }
    }

    pub fn ec_level(&self) -> ErrorCorrection {
        self.ec_level
    }

    /// Greyscale raster of the matrix: dark modules 0, light modules 255
    fn rasterize(&self, matrix: &BitMatrix) -> (usize, Vec<u8>) {
        let modules = matrix.size() + 2 * self.quiet_zone;
        let side = modules * self.module_px;
        let mut pixels = vec![255u8; side * side];

        for row in 0..matrix.size() {
            for col in 0..matrix.size() {
                if !matrix.get(row, col) {
                    continue;
                }
                let y0 = (row + self.quiet_zone) * self.module_px;
                let x0 = (col + self.quiet_zone) * self.module_px;
                for y in y0..y0 + self.module_px {
                    let line = &mut pixels[y * side..(y + 1) * side];
                    line[x0..x0 + self.module_px].fill(0);
                }
            }
        }

        (side, pixels)
    }
}

impl Default for QrCodec {
    fn default() -> Self {
        Self::new(ErrorCorrection::default())
    }
}

impl MatrixCodec for QrCodec {
    fn encode_text(&self, text: &str, version: u8) -> Result<BitMatrix> {
        let spec = spec_for(version)?;
        let code = QrCode::with_version(text.as_bytes(), Version::Normal(version as i16), self.ec_level.into())
            .map_err(|e| match e {
                QrError::DataTooLong => TonemarkError::PayloadTooLarge {
                    len: text.len(),
                    version,
                },
                other => TonemarkError::InvalidInput(format!("QR encode failed: {}", other)),
            })?;

        let width = code.width();
        if width != spec.matrix_size {
            return Err(TonemarkError::InvalidInput(format!(
                "QR encoder produced a {}x{} matrix for version {}",
                width, width, version
            )));
        }

        let mut matrix = BitMatrix::new(width);
        for row in 0..width {
            for col in 0..width {
                matrix.set(row, col, code[(col, row)] == Color::Dark);
            }
        }
        Ok(matrix)
    }

    fn decode_matrix(&self, matrix: &BitMatrix) -> Option<String> {
        if matrix.size() == 0 {
            return None;
        }

        let (side, pixels) = self.rasterize(matrix);
        let mut image = rqrr::PreparedImage::prepare_from_greyscale(side, side, |x, y| pixels[y * side + x]);

        for grid in image.detect_grids() {
            match grid.decode() {
                Ok((_, content)) => return Some(content),
                Err(e) => log::debug!("QR grid rejected: {:?}", e),
            }
        }
        None
    }
}
