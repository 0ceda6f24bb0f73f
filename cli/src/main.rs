mod audio;
mod commands;
mod error;
mod listen;
mod report;
mod server;

use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tonemark_core::{
    Band, DecoderConfig, ErrorCorrection, CORRUPTION_CEILING, DEFAULT_CYCLES, DEFAULT_SAMPLE_RATE,
    LIVE_POLL_INTERVAL_MS,
};

#[derive(Parser)]
#[command(name = "tonemark")]
#[command(about = "Hide QR payloads in audio as high-frequency tone patterns and recover them")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Decoder options shared by `decode` and `listen`
#[derive(Args, Debug, Clone)]
struct DecodeArgs {
    /// Frequency band preset (mobile, ultrasonic)
    #[arg(long, default_value = "mobile")]
    band: Band,

    /// Largest tolerated share of corrupted columns per cycle
    #[arg(long, default_value_t = CORRUPTION_CEILING)]
    ceiling: f32,

    /// Give up after this many milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Channel carrying the mark in multi-channel input
    #[arg(long, default_value_t = 0)]
    channel: usize,

    /// Skip the slot-wise consensus over repeated cycles
    #[arg(long)]
    no_consensus: bool,

    /// Skip the narrow-window emergency scan
    #[arg(long)]
    no_fallback: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl DecodeArgs {
    fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            band: self.band,
            corruption_ceiling: self.ceiling,
            timeout: self.timeout_ms.map(std::time::Duration::from_millis),
            consensus: !self.no_consensus,
            emergency_fallback: !self.no_fallback,
            ..DecoderConfig::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Embed a text payload into a carrier (or into silence)
    Encode {
        /// Output file (.wav or .tmrk)
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Text to embed
        #[arg(short, long)]
        text: String,

        /// Carrier audio (.wav or .tmrk); silence when omitted
        #[arg(short, long)]
        carrier: Option<PathBuf>,

        /// QR version 1-5 (matrix size 21-37)
        #[arg(short, long = "qr-version", default_value_t = 1)]
        qr_version: u8,

        /// Number of back-to-back transmissions
        #[arg(long, default_value_t = DEFAULT_CYCLES)]
        cycles: usize,

        /// Frequency band preset (mobile, ultrasonic)
        #[arg(long, default_value = "mobile")]
        band: Band,

        /// QR error correction level (l, m, q, h)
        #[arg(long, default_value = "m")]
        ec: ErrorCorrection,

        /// Output sample rate; the carrier is resampled when it differs
        #[arg(long)]
        sample_rate: Option<u32>,
    },

    /// Recover the payload from a recording
    Decode {
        /// Input file (.wav or .tmrk)
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[command(flatten)]
        options: DecodeArgs,
    },

    /// Stream a recording through a live session, decoding periodically
    Listen {
        /// Input WAV file standing in for the capture device
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        #[command(flatten)]
        options: DecodeArgs,

        /// Milliseconds between analysis passes
        #[arg(long, default_value_t = LIVE_POLL_INTERVAL_MS)]
        interval_ms: u64,

        /// Capture block size in milliseconds
        #[arg(long, default_value_t = 100)]
        block_ms: u64,

        /// Feed blocks at their playback pace instead of as fast as possible
        #[arg(long)]
        realtime: bool,
    },

    /// Show the frequency plan, or describe an audio file
    Info {
        /// Audio file to describe
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Only show this band
        #[arg(long)]
        band: Option<Band>,

        /// Sample rate used for cycle durations
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: u32,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP encode/decode service
    Serve {
        /// Listen address
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Per-request decode budget in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },
}

fn init_logger(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp_millis()
        .init();
}

fn run(cli: Cli) -> error::Result<()> {
    match cli.command {
        Commands::Encode {
            output,
            text,
            carrier,
            qr_version,
            cycles,
            band,
            ec,
            sample_rate,
        } => {
            init_logger(cli.verbose);
            commands::encode_command(
                &output,
                &commands::EncodeJob {
                    text,
                    carrier,
                    version: qr_version,
                    cycles,
                    band,
                    ec,
                    sample_rate,
                },
            )
        }
        Commands::Decode { input, options } => {
            init_logger(cli.verbose);
            commands::decode_command(&input, options.channel, options.decoder_config(), options.json)
        }
        Commands::Listen {
            input,
            options,
            interval_ms,
            block_ms,
            realtime,
        } => {
            init_logger(cli.verbose);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(listen::run(listen::ListenJob {
                input,
                channel: options.channel,
                decoder: options.decoder_config(),
                interval_ms,
                block_ms,
                realtime,
                json: options.json,
            }))
        }
        Commands::Info {
            file,
            band,
            sample_rate,
            json,
        } => {
            init_logger(cli.verbose);
            commands::info_command(file.as_deref(), band, sample_rate, json)
        }
        Commands::Serve { addr, timeout_ms } => {
            server::init_tracing(cli.verbose);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(addr, std::time::Duration::from_millis(timeout_ms)))
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_encode_defaults() {
        let cli = Cli::try_parse_from(["tonemark", "encode", "out.wav", "--text", "hi"]).unwrap();
        match cli.command {
            Commands::Encode {
                qr_version,
                cycles,
                band,
                ec,
                carrier,
                ..
            } => {
                assert_eq!(qr_version, 1);
                assert_eq!(cycles, DEFAULT_CYCLES);
                assert_eq!(band, Band::Mobile);
                assert_eq!(ec, ErrorCorrection::Medium);
                assert!(carrier.is_none());
            }
            _ => panic!("expected encode"),
        }
    }

    #[test]
    fn test_decode_options_map_to_config() {
        let cli = Cli::try_parse_from([
            "tonemark",
            "decode",
            "in.wav",
            "--band",
            "ultrasonic",
            "--ceiling",
            "0.5",
            "--timeout-ms",
            "250",
            "--no-fallback",
        ])
        .unwrap();
        match cli.command {
            Commands::Decode { options, .. } => {
                let config = options.decoder_config();
                assert_eq!(config.band, Band::Ultrasonic);
                assert_eq!(config.corruption_ceiling, 0.5);
                assert_eq!(config.timeout, Some(std::time::Duration::from_millis(250)));
                assert!(!config.emergency_fallback);
                assert!(config.consensus);
            }
            _ => panic!("expected decode"),
        }
    }

    #[test]
    fn test_unknown_band_rejected() {
        assert!(Cli::try_parse_from(["tonemark", "decode", "in.wav", "--band", "sonar"]).is_err());
    }
}
