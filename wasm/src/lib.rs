use tonemark_core::{
    Band, DecodeOutcome, Decoder, DecoderConfig, Encoder, EncoderConfig, ErrorCorrection, LiveConfig, LivePoll,
    LiveSession, QrCodec, TonemarkError,
};
use wasm_bindgen::prelude::*;

fn to_js(err: TonemarkError) -> JsValue {
    JsValue::from_str(&format!("{}: {}", err.kind(), err))
}

fn parse_band(band: &str) -> Result<Band, JsValue> {
    band.parse().map_err(to_js)
}

#[wasm_bindgen]
pub struct WasmEncoder {
    inner: Encoder,
}

#[wasm_bindgen]
impl WasmEncoder {
    /// `band` is "mobile" or "ultrasonic"; `ec` is one of l, m, q, h
    #[wasm_bindgen(constructor)]
    pub fn new(band: &str, ec: &str) -> Result<WasmEncoder, JsValue> {
        let ec: ErrorCorrection = ec.parse().map_err(to_js)?;
        Ok(WasmEncoder {
            inner: Encoder::with_codec(
                QrCodec::new(ec),
                EncoderConfig {
                    band: parse_band(band)?,
                    ..EncoderConfig::default()
                },
            ),
        })
    }

    /// Mix `cycles` transmissions of `text` into a mono carrier (Float32Array)
    #[wasm_bindgen]
    pub fn encode(
        &self,
        carrier: &[f32],
        sample_rate: u32,
        text: &str,
        version: u8,
        cycles: usize,
    ) -> Result<Vec<f32>, JsValue> {
        self.inner
            .encode(carrier, sample_rate, text, version, cycles)
            .map_err(to_js)
    }

    /// Samples needed for one cycle of `version` at `sample_rate`
    #[wasm_bindgen(js_name = cycleSamples)]
    pub fn cycle_samples(&self, version: u8, sample_rate: u32) -> Result<usize, JsValue> {
        let band = self.inner.frame_encoder().config().band;
        tonemark_core::spec_for_band(band, version)
            .map(|spec| spec.cycle_samples(sample_rate))
            .map_err(to_js)
    }
}

/// Decoded payload plus how it was found
#[wasm_bindgen]
pub struct DecodeResult {
    text: String,
    version: u8,
    confidence: f32,
    start_seconds: f32,
    corrupted_columns: Vec<u32>,
    recovery: String,
}

#[wasm_bindgen]
impl DecodeResult {
    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[wasm_bindgen(getter)]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    #[wasm_bindgen(getter, js_name = startSeconds)]
    pub fn start_seconds(&self) -> f32 {
        self.start_seconds
    }

    #[wasm_bindgen(getter, js_name = corruptedColumns)]
    pub fn corrupted_columns(&self) -> Vec<u32> {
        self.corrupted_columns.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn recovery(&self) -> String {
        self.recovery.clone()
    }
}

impl From<DecodeOutcome> for DecodeResult {
    fn from(outcome: DecodeOutcome) -> Self {
        Self {
            corrupted_columns: outcome.corrupted_columns.iter().map(|&c| c as u32).collect(),
            recovery: outcome.recovery.name().to_string(),
            text: outcome.text,
            version: outcome.version,
            confidence: outcome.confidence,
            start_seconds: outcome.start_seconds,
        }
    }
}

fn decoder_config(band: &str) -> Result<DecoderConfig, JsValue> {
    // No wall-clock limit: Instant is unavailable on wasm32-unknown-unknown
    Ok(DecoderConfig {
        band: parse_band(band)?,
        timeout: None,
        ..DecoderConfig::default()
    })
}

#[wasm_bindgen]
pub struct WasmDecoder {
    inner: Decoder,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new(band: &str) -> Result<WasmDecoder, JsValue> {
        Ok(WasmDecoder {
            inner: Decoder::with_config(decoder_config(band)?),
        })
    }

    /// Recover the payload from mono samples (Float32Array)
    #[wasm_bindgen]
    pub fn decode(&self, samples: &[f32], sample_rate: u32) -> Result<DecodeResult, JsValue> {
        self.inner
            .decode(samples, sample_rate)
            .map(DecodeResult::from)
            .map_err(to_js)
    }
}

/// Rolling microphone buffer; feed it from an AudioWorklet and poll on a timer
#[wasm_bindgen]
pub struct WasmLiveSession {
    inner: LiveSession,
    status: String,
}

#[wasm_bindgen]
impl WasmLiveSession {
    #[wasm_bindgen(constructor)]
    pub fn new(band: &str, sample_rate: u32) -> Result<WasmLiveSession, JsValue> {
        let config = LiveConfig {
            decoder: decoder_config(band)?,
            capacity: None,
        };
        Ok(WasmLiveSession {
            inner: LiveSession::new(sample_rate, config),
            status: "waiting".to_string(),
        })
    }

    /// Append captured samples; false once the session is stopped
    #[wasm_bindgen]
    pub fn push(&self, samples: &[f32]) -> bool {
        self.inner.push_samples(samples)
    }

    #[wasm_bindgen]
    pub fn stop(&self) {
        self.inner.stop();
    }

    #[wasm_bindgen(getter)]
    pub fn buffered(&self) -> usize {
        self.inner.buffered()
    }

    /// Outcome of the last poll: waiting, busy, stopped, no-signal or decoded
    #[wasm_bindgen(getter)]
    pub fn status(&self) -> String {
        self.status.clone()
    }

    /// Run one analysis pass; undefined until a payload is found
    #[wasm_bindgen]
    pub fn poll(&mut self) -> Option<DecodeResult> {
        let (status, result) = match self.inner.analyze() {
            LivePoll::Decoded(outcome) => ("decoded".to_string(), Some(DecodeResult::from(outcome))),
            LivePoll::Waiting { .. } => ("waiting".to_string(), None),
            LivePoll::Busy => ("busy".to_string(), None),
            LivePoll::Stopped => ("stopped".to_string(), None),
            LivePoll::NoSignal(err) => (format!("no-signal: {}", err.kind()), None),
        };
        self.status = status;
        result
    }
}

#[wasm_bindgen(start)]
pub fn init() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_then_decode() {
        let encoder = WasmEncoder::new("mobile", "m").unwrap();
        let len = encoder.cycle_samples(1, 44100).unwrap();
        let marked = encoder.encode(&vec![0.0; len], 44100, "wasm", 1, 1).unwrap();

        let result = WasmDecoder::new("mobile").unwrap().decode(&marked, 44100).unwrap();
        assert_eq!(result.text(), "wasm");
        assert_eq!(result.version(), 1);
        assert_eq!(result.recovery(), "candidate");
    }

    #[test]
    fn test_live_session_reports_status() {
        let encoder = WasmEncoder::new("mobile", "m").unwrap();
        let len = encoder.cycle_samples(1, 44100).unwrap();
        let marked = encoder.encode(&vec![0.0; len], 44100, "live", 1, 1).unwrap();

        let mut session = WasmLiveSession::new("mobile", 44100).unwrap();
        assert!(session.poll().is_none());
        assert_eq!(session.status(), "waiting");

        assert!(session.push(&marked));
        let result = session.poll().unwrap();
        assert_eq!(result.text(), "live");
        assert_eq!(session.status(), "decoded");

        session.stop();
        assert!(!session.push(&marked));
    }
}
