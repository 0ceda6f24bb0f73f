//! HTTP front end for encoding and decoding.
//!
//! Audio travels as base64 WAV inside JSON bodies. Every request gets a
//! uuid that tags its tracing span and comes back in the response.

use crate::audio::{self, Audio};
use crate::commands::{encode_audio, EncodeJob};
use crate::error::{CliError, Result};
use crate::report::{version_table, DecodeReport, VersionInfo};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;
use tonemark_core::{Band, Decoder, DecoderConfig, ErrorCorrection, TonemarkError, DEFAULT_CYCLES, DEFAULT_SAMPLE_RATE};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
const MAX_CYCLES: usize = 16;
const MAX_SAMPLE_RATE: u32 = 192_000;

pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Upper bound on any single decode
    pub decode_budget: Duration,
}

#[derive(Debug, Deserialize)]
pub struct EncodeRequest {
    pub text: String,
    #[serde(default = "default_version")]
    pub version: u8,
    #[serde(default = "default_cycles")]
    pub cycles: usize,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub ec: Option<String>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    /// Base64 WAV to mark; silence when absent
    #[serde(default)]
    pub carrier_wav: Option<String>,
}

fn default_version() -> u8 {
    1
}

fn default_cycles() -> usize {
    DEFAULT_CYCLES
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncodeResponse {
    pub request_id: Uuid,
    pub wav: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_seconds: f32,
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    pub wav: String,
    #[serde(default)]
    pub band: Option<String>,
    #[serde(default)]
    pub channel: usize,
    #[serde(default)]
    pub ceiling: Option<f32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecodeResponse {
    pub request_id: Uuid,
    #[serde(flatten)]
    pub report: DecodeReport,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub request_id: Option<Uuid>,
    pub kind: String,
    pub message: String,
}

/// Failure returned to HTTP clients as `{kind, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    request_id: Option<Uuid>,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_input",
            message: message.into(),
            request_id: None,
        }
    }

    fn tagged(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}

impl From<CliError> for ApiError {
    fn from(err: CliError) -> Self {
        let (status, kind) = match &err {
            CliError::Core(core) => {
                let status = match core {
                    TonemarkError::NoCycleDetected { .. }
                    | TonemarkError::CycleCorrupted { .. }
                    | TonemarkError::ExternalDecodeFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    TonemarkError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
                    TonemarkError::DeviceAccess(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, core.kind())
            }
            CliError::Wav(_) | CliError::UnsupportedFormat(_) => (StatusCode::BAD_REQUEST, "unsupported_audio"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        Self {
            status,
            kind,
            message: err.to_string(),
            request_id: None,
        }
    }
}

impl From<TonemarkError> for ApiError {
    fn from(err: TonemarkError) -> Self {
        CliError::Core(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(kind = self.kind, "{}", self.message);
        } else {
            tracing::warn!(kind = self.kind, "{}", self.message);
        }
        let body = ErrorBody {
            request_id: self.request_id,
            kind: self.kind.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn parse_option<T: std::str::FromStr<Err = TonemarkError>>(value: Option<&str>) -> std::result::Result<Option<T>, ApiError> {
    value.map(|v| v.parse::<T>()).transpose().map_err(ApiError::from)
}

fn decode_base64_wav(data: &str) -> std::result::Result<Audio, ApiError> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| ApiError::bad_request(format!("wav is not valid base64: {}", e)))?;
    Ok(audio::wav_from_bytes(&bytes)?)
}

async fn run_blocking<T, F>(span: tracing::Span, work: F) -> std::result::Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || span.in_scope(work))
        .await
        .map_err(|e| ApiError::from(CliError::Task(e)))?
}

async fn health() -> &'static str {
    "ok"
}

async fn versions() -> Json<Vec<VersionInfo>> {
    Json(version_table(&Band::ALL, DEFAULT_SAMPLE_RATE))
}

async fn encode(Json(req): Json<EncodeRequest>) -> std::result::Result<Json<EncodeResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("encode", %request_id, version = req.version, cycles = req.cycles);

    if !(1..=MAX_CYCLES).contains(&req.cycles) {
        return Err(ApiError::bad_request(format!("cycles {} outside 1..={}", req.cycles, MAX_CYCLES)).tagged(request_id));
    }
    if let Some(rate) = req.sample_rate.filter(|rate| !(1..=MAX_SAMPLE_RATE).contains(rate)) {
        return Err(ApiError::bad_request(format!("sample rate {} outside 1..={} Hz", rate, MAX_SAMPLE_RATE))
            .tagged(request_id));
    }

    let result = run_blocking(span, move || {
        let job = EncodeJob {
            band: parse_option::<Band>(req.band.as_deref())?.unwrap_or_default(),
            ec: parse_option::<ErrorCorrection>(req.ec.as_deref())?.unwrap_or_default(),
            text: req.text,
            carrier: None,
            version: req.version,
            cycles: req.cycles,
            sample_rate: req.sample_rate,
        };
        let carrier = req.carrier_wav.as_deref().map(decode_base64_wav).transpose()?;
        let marked = encode_audio(&job, carrier)?;
        let wav = audio::wav_bytes(&marked)?;
        tracing::info!(bytes = wav.len(), "encoded {:.2} s", marked.duration_secs());

        Ok(EncodeResponse {
            request_id,
            wav: STANDARD.encode(wav),
            sample_rate: marked.sample_rate,
            channels: marked.channels,
            duration_seconds: marked.duration_secs(),
        })
    })
    .await;

    result.map(Json).map_err(|e| e.tagged(request_id))
}

async fn decode(
    State(state): State<AppState>,
    Json(req): Json<DecodeRequest>,
) -> std::result::Result<Json<DecodeResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("decode", %request_id);
    let budget = req
        .timeout_ms
        .map(Duration::from_millis)
        .map_or(state.decode_budget, |t| t.min(state.decode_budget));

    let result = run_blocking(span, move || {
        let recording = decode_base64_wav(&req.wav)?;
        let samples = recording.channel(req.channel)?;

        let mut config = DecoderConfig {
            band: parse_option::<Band>(req.band.as_deref())?.unwrap_or_default(),
            timeout: Some(budget),
            ..DecoderConfig::default()
        };
        if let Some(ceiling) = req.ceiling {
            if !(0.0..=1.0).contains(&ceiling) {
                return Err(ApiError::bad_request(format!("ceiling {} outside 0..=1", ceiling)));
            }
            config.corruption_ceiling = ceiling;
        }

        let outcome = Decoder::with_config(config).decode(&samples, recording.sample_rate)?;
        tracing::info!(version = outcome.version, confidence = outcome.confidence, "decoded");
        Ok(DecodeResponse {
            request_id,
            report: DecodeReport::from(&outcome),
        })
    })
    .await;

    result.map(Json).map_err(|e| e.tagged(request_id))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/versions", get(versions))
        .route("/encode", post(encode))
        .route("/decode", post(decode))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, decode_budget: Duration) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(AppState { decode_budget }))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
