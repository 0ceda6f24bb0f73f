//! Acoustic watermark modem for QR bit matrices
//!
//! A QR matrix is cut into 6-bit column chunks, each chunk is sent as one tone
//! on a 64-point frequency grid above the audible content, and the framed
//! transmission is mixed into a carrier. Decoding scans for start markers,
//! aligns, demodulates by winner-take-all and hands the matrix back to the
//! QR reader.

pub mod budget;
pub mod chunking;
pub mod codec;
pub mod container;
pub mod decoder;
pub mod demod;
pub mod encoder;
pub mod error;
pub mod live;
pub mod matrix;
pub mod plan;
pub mod probe;
pub mod resample;
pub mod scan;
pub mod tone;

pub use codec::{ErrorCorrection, MatrixCodec, QrCodec};
pub use container::{read_container, write_container, ContainerAudio};
pub use decoder::{DecodeOutcome, Decoder, DecoderConfig, FrameDecoder, Recovery};
pub use encoder::{duplicate_to_stereo, Encoder, EncoderConfig, FrameEncoder};
pub use error::{Result, TonemarkError};
pub use live::{LiveConfig, LivePoll, LiveSession, SampleSource, SliceSource};
pub use matrix::BitMatrix;
pub use plan::{spec_for, spec_for_band, Band, VersionSpec};

// Protocol constants
pub const MIN_VERSION: u8 = 1;
pub const MAX_VERSION: u8 = 5;
pub const CHUNK_BITS: usize = 6;
pub const DATA_GRID_BINS: usize = 1 << CHUNK_BITS; // 64
pub const DATA_GRID_STEP_HZ: f32 = 30.0;
pub const DETECTION_TOLERANCE_HZ: f32 = 10.0;
/// Highest tone must stay this far below Nyquist
pub const NYQUIST_GUARD_HZ: f32 = 200.0;

pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_CYCLES: usize = 3;

// Embedding
pub const EMBED_RATIO: f32 = 0.1;
pub const FLOOR_AMPLITUDE: f32 = 0.05;

// Marker scan
pub const SCAN_WINDOW_MS: u32 = 100;
pub const SCAN_HOP_MS: u32 = 50;
pub const SCAN_THRESHOLD_FRACTION: f32 = 0.5;
pub const SCAN_ABSOLUTE_FLOOR: f32 = 0.002;
pub const MIN_CANDIDATE_SEPARATION_SECS: f32 = 0.8;
pub const MAX_CANDIDATES: usize = 5;

// Emergency fallback scan (version 1 only)
pub const FALLBACK_WINDOW_MS: u32 = 20;
pub const FALLBACK_HOP_MS: u32 = 10;
pub const FALLBACK_THRESHOLD_FRACTION: f32 = 0.3;
pub const FALLBACK_ABSOLUTE_FLOOR: f32 = 1e-6;
pub const FALLBACK_MAX_CANDIDATES: usize = 3;

// Demodulation and validation
/// Share of each chunk slot skipped at both edges
pub const EDGE_MARGIN: f32 = 0.1;
pub const CORRUPTION_CEILING: f32 = 0.30;
pub const BOUNDARY_PENALTY: f32 = 0.75;

// Live capture
/// Extra history kept beyond the longest cycle
pub const LIVE_HEADROOM_SECS: f32 = 2.0;
pub const LIVE_POLL_INTERVAL_MS: u64 = 1000;
