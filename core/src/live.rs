use crate::codec::{MatrixCodec, QrCodec};
use crate::decoder::{DecodeOutcome, Decoder, DecoderConfig};
use crate::error::{Result, TonemarkError};
use crate::plan::longest_cycle_samples;
use crate::LIVE_HEADROOM_SECS;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Producer of captured mono samples
pub trait SampleSource {
    fn sample_rate(&self) -> u32;

    /// Next block of at most `max` samples; `Ok(None)` once the source is exhausted
    fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<f32>>>;
}

/// Replays an in-memory buffer
pub struct SliceSource {
    samples: Vec<f32>,
    position: usize,
    sample_rate: u32,
}

impl SliceSource {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            sample_rate,
        }
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl SampleSource for SliceSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self, max: usize) -> Result<Option<Vec<f32>>> {
        if max == 0 {
            return Err(TonemarkError::DeviceAccess("zero-length read requested".to_string()));
        }
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + max).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}

#[derive(Debug, Clone)]
pub struct LiveConfig {
    pub decoder: DecoderConfig,
    /// Rolling buffer size in samples; None sizes it from the band
    pub capacity: Option<usize>,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            decoder: DecoderConfig::default(),
            capacity: None,
        }
    }
}

/// Result of one analysis tick
#[derive(Debug, Clone, PartialEq)]
pub enum LivePoll {
    /// Another pass is still running; this tick was dropped
    Busy,
    Stopped,
    /// Not enough audio buffered for the shortest cycle yet
    Waiting { buffered: usize, needed: usize },
    NoSignal(TonemarkError),
    Decoded(DecodeOutcome),
}

/// Clears the in-flight flag when an analysis pass ends, however it ends
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Continuous capture with periodic decode attempts
///
/// Capture callbacks append through `push_samples`; a timer calls `analyze`.
/// At most one analysis runs at a time and it works on a snapshot, so capture
/// never waits on decoding.
pub struct LiveSession<C: MatrixCodec = QrCodec> {
    decoder: Decoder<C>,
    sample_rate: u32,
    capacity: usize,
    min_samples: usize,
    buffer: Mutex<VecDeque<f32>>,
    listening: AtomicBool,
    in_flight: AtomicBool,
}

impl LiveSession<QrCodec> {
    pub fn new(sample_rate: u32, config: LiveConfig) -> Self {
        Self::with_codec(QrCodec::default(), sample_rate, config)
    }
}

impl<C: MatrixCodec> LiveSession<C> {
    pub fn with_codec(codec: C, sample_rate: u32, config: LiveConfig) -> Self {
        let band = config.decoder.band;
        let capacity = config.capacity.unwrap_or_else(|| {
            longest_cycle_samples(band, sample_rate) + (LIVE_HEADROOM_SECS * sample_rate as f32) as usize
        });
        let min_samples = band
            .specs()
            .iter()
            .map(|s| s.cycle_samples(sample_rate))
            .min()
            .unwrap_or(0)
            .min(capacity);

        log::info!(
            "Live session at {} Hz: buffer {} samples ({:.1} s), analysis after {} samples",
            sample_rate,
            capacity,
            capacity as f32 / sample_rate as f32,
            min_samples
        );

        Self {
            decoder: Decoder::with_codec(codec, config.decoder),
            sample_rate,
            capacity,
            min_samples,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            listening: AtomicBool::new(true),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        if self.listening.swap(false, Ordering::AcqRel) {
            log::info!("Live session stopped");
        }
    }

    pub fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Append captured samples, dropping the oldest beyond capacity
    ///
    /// Returns false once the session has stopped; the samples are ignored.
    pub fn push_samples(&self, samples: &[f32]) -> bool {
        if !self.is_listening() {
            return false;
        }
        let mut buffer = self.lock_buffer();
        let fresh = if samples.len() > self.capacity {
            &samples[samples.len() - self.capacity..]
        } else {
            samples
        };
        let overflow = (buffer.len() + fresh.len()).saturating_sub(self.capacity);
        buffer.drain(..overflow);
        buffer.extend(fresh.iter().copied());
        true
    }

    /// Pull one block from a source into the buffer
    ///
    /// Returns the number of samples read, or None when the source is exhausted.
    pub fn feed_from<S: SampleSource + ?Sized>(&self, source: &mut S, max: usize) -> Result<Option<usize>> {
        if source.sample_rate() != self.sample_rate {
            return Err(TonemarkError::DeviceAccess(format!(
                "source runs at {} Hz, session expects {} Hz",
                source.sample_rate(),
                self.sample_rate
            )));
        }
        match source.read_chunk(max)? {
            Some(chunk) => {
                self.push_samples(&chunk);
                Ok(Some(chunk.len()))
            }
            None => Ok(None),
        }
    }

    /// One analysis pass over a snapshot of the buffer
    pub fn analyze(&self) -> LivePoll {
        if !self.is_listening() {
            return LivePoll::Stopped;
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::trace!("Analysis tick dropped, previous pass still running");
            return LivePoll::Busy;
        }
        let _guard = PassGuard(&self.in_flight);

        let snapshot: Vec<f32> = {
            let buffer = self.lock_buffer();
            if buffer.len() < self.min_samples {
                return LivePoll::Waiting {
                    buffered: buffer.len(),
                    needed: self.min_samples,
                };
            }
            buffer.iter().copied().collect()
        };

        match self.decoder.decode(&snapshot, self.sample_rate) {
            Ok(outcome) => {
                self.stop();
                LivePoll::Decoded(outcome)
            }
            Err(err) => {
                log::debug!("Live pass over {} samples: {}", snapshot.len(), err);
                LivePoll::NoSignal(err)
            }
        }
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<f32>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
