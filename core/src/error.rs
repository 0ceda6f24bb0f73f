use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TonemarkError {
    #[error("Unsupported version {0} (expected 1..=5)")]
    UnsupportedVersion(u8),

    #[error("Carrier too short: {available} samples available, one cycle needs {required}")]
    InsufficientCarrierDuration { required: usize, available: usize },

    #[error("No cycle detected (max marker strength {max_marker_strength:.6})")]
    NoCycleDetected { max_marker_strength: f32 },

    #[error("Cycle corrupted: {corrupted_columns}/{total_columns} columns failed validation")]
    CycleCorrupted {
        corrupted_columns: usize,
        total_columns: usize,
    },

    #[error("Matrix decoder rejected version {version} payload after {candidates_examined} candidate(s)")]
    ExternalDecodeFailure {
        version: u8,
        candidates_examined: usize,
    },

    #[error("Processing budget exceeded after {elapsed_ms} ms ({candidates_found} candidate(s) found)")]
    Timeout {
        elapsed_ms: u64,
        candidates_found: usize,
    },

    #[error("Capture device error: {0}")]
    DeviceAccess(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Payload of {len} bytes does not fit a version {version} matrix")]
    PayloadTooLarge { len: usize, version: u8 },
}

impl TonemarkError {
    /// Stable machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TonemarkError::UnsupportedVersion(_) => "unsupported_version",
            TonemarkError::InsufficientCarrierDuration { .. } => "insufficient_carrier_duration",
            TonemarkError::NoCycleDetected { .. } => "no_cycle_detected",
            TonemarkError::CycleCorrupted { .. } => "cycle_corrupted",
            TonemarkError::ExternalDecodeFailure { .. } => "external_decode_failure",
            TonemarkError::Timeout { .. } => "timeout",
            TonemarkError::DeviceAccess(_) => "device_access",
            TonemarkError::InvalidInput(_) => "invalid_input",
            TonemarkError::PayloadTooLarge { .. } => "payload_too_large",
        }
    }
}

pub type Result<T> = std::result::Result<T, TonemarkError>;
