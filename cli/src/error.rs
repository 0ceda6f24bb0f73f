use thiserror::Error;
use tonemark_core::TonemarkError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] TonemarkError),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    /// Process exit code: 2 for bad input, 3 when nothing could be decoded
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Core(TonemarkError::NoCycleDetected { .. })
            | CliError::Core(TonemarkError::CycleCorrupted { .. })
            | CliError::Core(TonemarkError::ExternalDecodeFailure { .. })
            | CliError::Core(TonemarkError::Timeout { .. }) => 3,
            CliError::Core(_) | CliError::UnsupportedFormat(_) => 2,
            CliError::Interrupted => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
