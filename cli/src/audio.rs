use crate::error::{CliError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tonemark_core::resample::extract_channel;
use tonemark_core::{read_container, write_container, SampleSource, TonemarkError};

/// Interleaved audio as read from or written to disk
#[derive(Debug, Clone, PartialEq)]
pub struct Audio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl Audio {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    pub fn channel(&self, channel: usize) -> Result<Vec<f32>> {
        Ok(extract_channel(&self.samples, self.channels as usize, channel)?)
    }
}

fn is_container(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tmrk"))
}

/// Decode a WAV stream (16/24/32-bit integer or 32-bit float)
pub fn read_wav<R: Read>(reader: WavReader<R>) -> Result<Audio> {
    let spec = reader.spec();
    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1u64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
        (SampleFormat::Float, 32) => reader.into_samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (format, bits) => {
            return Err(CliError::UnsupportedFormat(format!("{:?} at {} bits", format, bits)));
        }
    };

    Ok(Audio {
        samples,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
    })
}

pub fn wav_from_bytes(bytes: &[u8]) -> Result<Audio> {
    read_wav(WavReader::new(Cursor::new(bytes))?)
}

/// Load a `.wav` file or a `.tmrk` container
pub fn load(path: &Path) -> Result<Audio> {
    let audio = if is_container(path) {
        let container = read_container(&std::fs::read(path)?)?;
        Audio {
            channels: container.header.channels as u16,
            sample_rate: container.header.sample_rate,
            samples: container.samples,
        }
    } else {
        read_wav(WavReader::open(path)?)?
    };

    log::info!(
        "Read {}: {} Hz, {} channel(s), {:.2} s",
        path.display(),
        audio.sample_rate,
        audio.channels,
        audio.duration_secs()
    );
    Ok(audio)
}

fn write_wav<W: std::io::Write + Seek>(writer: W, audio: &Audio) -> Result<()> {
    let spec = WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::new(writer, spec)?;
    for &sample in &audio.samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * 32767.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// 16-bit PCM WAV image of the audio
pub fn wav_bytes(audio: &Audio) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, audio)?;
    Ok(cursor.into_inner())
}

/// Write a `.wav` file or a `.tmrk` container, chosen by extension
pub fn save(path: &Path, audio: &Audio) -> Result<()> {
    if is_container(path) {
        let channels = u8::try_from(audio.channels)
            .map_err(|_| CliError::UnsupportedFormat(format!("{} channels", audio.channels)))?;
        std::fs::write(path, write_container(&audio.samples, channels, audio.sample_rate)?)?;
    } else {
        write_wav(File::create(path)?, audio)?;
    }
    log::info!("Wrote {} ({:.2} s)", path.display(), audio.duration_secs());
    Ok(())
}

/// Streams one channel of a WAV file block by block, standing in for a capture device
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    channels: usize,
    channel: usize,
    sample_rate: u32,
    format: (SampleFormat, u16),
}

impl WavSource {
    pub fn open(path: &Path, channel: usize) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        if channel >= spec.channels as usize {
            return Err(CliError::UnsupportedFormat(format!(
                "channel {} requested from {}-channel audio",
                channel, spec.channels
            )));
        }
        Ok(Self {
            reader,
            channels: spec.channels as usize,
            channel,
            sample_rate: spec.sample_rate,
            format: (spec.sample_format, spec.bits_per_sample),
        })
    }

    fn next_sample(&mut self) -> Option<std::result::Result<f32, hound::Error>> {
        match self.format {
            (SampleFormat::Int, 16) => self.reader.samples::<i16>().next().map(|s| s.map(|v| v as f32 / 32768.0)),
            (SampleFormat::Int, bits) => {
                let scale = (1u64 << (bits - 1)) as f32;
                self.reader.samples::<i32>().next().map(|s| s.map(|v| v as f32 / scale))
            }
            (SampleFormat::Float, _) => self.reader.samples::<f32>().next(),
        }
    }
}

impl SampleSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_chunk(&mut self, max: usize) -> tonemark_core::Result<Option<Vec<f32>>> {
        let mut chunk = Vec::with_capacity(max);
        'frames: while chunk.len() < max {
            for ch in 0..self.channels {
                match self.next_sample() {
                    Some(Ok(value)) if ch == self.channel => chunk.push(value),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(TonemarkError::DeviceAccess(e.to_string())),
                    None => break 'frames,
                }
            }
        }
        Ok(if chunk.is_empty() { None } else { Some(chunk) })
    }
}
