use crate::audio::{self, Audio};
use crate::error::Result;
use crate::report::{version_table, DecodeReport, VersionInfo};
use std::path::{Path, PathBuf};
use tonemark_core::plan::{min_sample_rate, spec_for_band};
use tonemark_core::resample::{extract_channel, resample_audio};
use tonemark_core::{
    Band, Decoder, DecoderConfig, Encoder, EncoderConfig, ErrorCorrection, MatrixCodec, QrCodec, TonemarkError,
    DEFAULT_SAMPLE_RATE,
};

/// Parameters of one `encode` invocation
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub text: String,
    pub carrier: Option<PathBuf>,
    pub version: u8,
    pub cycles: usize,
    pub band: Band,
    pub ec: ErrorCorrection,
    pub sample_rate: Option<u32>,
}

/// Rate used when nothing else decides it
pub fn default_rate(band: Band) -> u32 {
    DEFAULT_SAMPLE_RATE.max(min_sample_rate(band).next_multiple_of(8000))
}

/// Resample every channel of interleaved audio
pub fn resample_interleaved(audio: &Audio, to_rate: u32) -> Result<Audio> {
    if audio.sample_rate == to_rate {
        return Ok(audio.clone());
    }
    let channels = audio.channels as usize;
    let converted: Vec<Vec<f32>> = (0..channels)
        .map(|ch| {
            extract_channel(&audio.samples, channels, ch).map(|mono| resample_audio(&mono, audio.sample_rate, to_rate))
        })
        .collect::<tonemark_core::Result<_>>()?;

    let frames = converted.first().map_or(0, |c| c.len());
    let mut samples = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        for channel in &converted {
            samples.push(channel[frame]);
        }
    }
    log::info!("Resampled carrier {} Hz -> {} Hz", audio.sample_rate, to_rate);
    Ok(Audio {
        samples,
        channels: audio.channels,
        sample_rate: to_rate,
    })
}

/// Embed the payload and return the marked audio
pub fn encode_audio(job: &EncodeJob, carrier: Option<Audio>) -> Result<Audio> {
    let spec = spec_for_band(job.band, job.version)?;
    let carrier = match carrier {
        Some(audio) => match job.sample_rate {
            Some(rate) => resample_interleaved(&audio, rate)?,
            None => audio,
        },
        None => {
            let rate = job.sample_rate.unwrap_or_else(|| default_rate(job.band));
            let len = spec.cycle_samples(rate).checked_mul(job.cycles.max(1)).ok_or_else(|| {
                TonemarkError::InvalidInput(format!("{} cycles at {} Hz do not fit in memory", job.cycles, rate))
            })?;
            Audio::mono(vec![0.0; len], rate)
        }
    };

    let encoder = Encoder::with_codec(
        QrCodec::new(job.ec),
        EncoderConfig {
            band: job.band,
            ..EncoderConfig::default()
        },
    );
    let matrix = encoder.codec().encode_text(&job.text, job.version)?;
    let samples = encoder.frame_encoder().encode_interleaved(
        &carrier.samples,
        carrier.channels as usize,
        &matrix,
        job.version,
        job.cycles,
        carrier.sample_rate,
    )?;

    Ok(Audio {
        samples,
        channels: carrier.channels,
        sample_rate: carrier.sample_rate,
    })
}

pub fn encode_command(output: &Path, job: &EncodeJob) -> Result<()> {
    let carrier = job.carrier.as_deref().map(audio::load).transpose()?;
    let marked = encode_audio(job, carrier)?;
    audio::save(output, &marked)?;

    println!(
        "Encoded {} bytes as version {} x{} ({} band) into {} ({:.2} s at {} Hz)",
        job.text.len(),
        job.version,
        job.cycles,
        job.band.name(),
        output.display(),
        marked.duration_secs(),
        marked.sample_rate
    );
    Ok(())
}

pub fn decode_command(input: &Path, channel: usize, config: DecoderConfig, json: bool) -> Result<()> {
    let recording = audio::load(input)?;
    let samples = recording.channel(channel)?;

    let decoder = Decoder::with_config(config);
    let outcome = decoder.decode(&samples, recording.sample_rate)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&DecodeReport::from(&outcome))?);
    } else {
        println!("Decoded: {}", outcome.text);
        println!(
            "  version {}, confidence {:.2}, at {:.3} s, {} candidate(s), recovery {}",
            outcome.version,
            outcome.confidence,
            outcome.start_seconds,
            outcome.candidates_examined,
            outcome.recovery.name()
        );
        if !outcome.corrupted_columns.is_empty() {
            println!("  repaired columns: {:?}", outcome.corrupted_columns);
        }
    }
    Ok(())
}

pub fn info_command(file: Option<&Path>, band: Option<Band>, sample_rate: u32, json: bool) -> Result<()> {
    if let Some(path) = file {
        let recording = audio::load(path)?;
        let playable: Vec<&str> = Band::ALL
            .iter()
            .filter(|b| recording.sample_rate >= min_sample_rate(**b))
            .map(|b| b.name())
            .collect();
        println!(
            "{}: {} Hz, {} channel(s), {} frames ({:.2} s); bands: {}",
            path.display(),
            recording.sample_rate,
            recording.channels,
            recording.frames(),
            recording.duration_secs(),
            if playable.is_empty() { "none".to_string() } else { playable.join(", ") }
        );
        return Ok(());
    }

    if sample_rate == 0 {
        return Err(TonemarkError::InvalidInput("sample rate must be positive".to_string()).into());
    }
    let bands: Vec<Band> = band.map_or_else(|| Band::ALL.to_vec(), |b| vec![b]);
    let table = version_table(&bands, sample_rate);

    if json {
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }
    println!(
        "{:<11} {:>3} {:>6} {:>7} {:>9} {:>9} {:>13} {:>6} {:>8}",
        "band", "ver", "size", "chunks", "start Hz", "end Hz", "grid Hz", "chunk", "cycle s"
    );
    for VersionInfo {
        band,
        version,
        matrix_size,
        chunks_per_column,
        start_marker_hz,
        end_marker_hz,
        grid_base_hz,
        grid_top_hz,
        chunk_ms,
        cycle_seconds,
    } in table
    {
        println!(
            "{:<11} {:>3} {:>6} {:>7} {:>9.0} {:>9.0} {:>6.0}-{:<6.0} {:>4}ms {:>8.2}",
            band,
            version,
            matrix_size,
            chunks_per_column,
            start_marker_hz,
            end_marker_hz,
            grid_base_hz,
            grid_top_hz,
            chunk_ms,
            cycle_seconds
        );
    }
    Ok(())
}
