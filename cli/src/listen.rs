use crate::audio::WavSource;
use crate::error::{CliError, Result};
use crate::report::DecodeReport;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tonemark_core::{DecoderConfig, LiveConfig, LivePoll, LiveSession, SampleSource, TonemarkError};

#[derive(Debug, Clone)]
pub struct ListenJob {
    pub input: PathBuf,
    pub channel: usize,
    pub decoder: DecoderConfig,
    pub interval_ms: u64,
    pub block_ms: u64,
    pub realtime: bool,
    pub json: bool,
}

/// Stops the session when the listen loop exits, whichever way it exits
struct SessionGuard(Arc<LiveSession>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Pump the source into the session until it runs dry or the session stops
fn capture(
    mut source: WavSource,
    session: Arc<LiveSession>,
    block: usize,
    pace: Option<Duration>,
    exhausted: Arc<AtomicBool>,
) -> tonemark_core::Result<()> {
    while session.is_listening() {
        match session.feed_from(&mut source, block)? {
            Some(_) => {
                if let Some(pace) = pace {
                    std::thread::sleep(pace);
                }
            }
            None => break,
        }
    }
    exhausted.store(true, Ordering::Release);
    log::debug!("Capture finished");
    Ok(())
}

pub async fn run(job: ListenJob) -> Result<()> {
    let source = WavSource::open(&job.input, job.channel)?;
    let sample_rate = source.sample_rate();
    let block = ((sample_rate as u64 * job.block_ms) / 1000).max(1) as usize;

    let session = Arc::new(LiveSession::new(
        sample_rate,
        LiveConfig {
            decoder: job.decoder.clone(),
            capacity: None,
        },
    ));
    let _guard = SessionGuard(session.clone());

    let exhausted = Arc::new(AtomicBool::new(false));
    let pace = job.realtime.then(|| Duration::from_millis(job.block_ms));
    let mut capture_task = {
        let session = session.clone();
        let exhausted = exhausted.clone();
        tokio::task::spawn_blocking(move || capture(source, session, block, pace, exhausted))
    };
    let mut capture_running = true;

    let (tx, mut rx) = mpsc::channel::<(bool, LivePoll)>(8);
    let mut ticker = tokio::time::interval(Duration::from_millis(job.interval_ms.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    log::info!("Listening on {} at {} Hz", job.input.display(), sample_rate);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::warn!("Interrupted, stopping live session");
                return Err(CliError::Interrupted);
            }
            finished = &mut capture_task, if capture_running => {
                capture_running = false;
                finished??;
            }
            _ = ticker.tick() => {
                // Passes that start after the source ran dry see all the audio there will be
                let final_pass = exhausted.load(Ordering::Acquire);
                let session = session.clone();
                let tx = tx.clone();
                tokio::task::spawn_blocking(move || {
                    let poll = session.analyze();
                    let _ = tx.blocking_send((final_pass, poll));
                });
            }
            Some((final_pass, poll)) = rx.recv() => match poll {
                LivePoll::Decoded(outcome) => {
                    if job.json {
                        println!("{}", serde_json::to_string_pretty(&DecodeReport::from(&outcome))?);
                    } else {
                        println!("Decoded: {}", outcome.text);
                        println!(
                            "  version {}, confidence {:.2}, at {:.3} s in buffer",
                            outcome.version, outcome.confidence, outcome.start_seconds
                        );
                    }
                    return Ok(());
                }
                LivePoll::Busy => log::debug!("Analysis pass still running, tick skipped"),
                // Only a successful pass stops the session here; its result is still in flight
                LivePoll::Stopped => log::debug!("Session stopped, waiting for the decoded result"),
                LivePoll::Waiting { buffered, needed } => {
                    if final_pass {
                        return Err(TonemarkError::InvalidInput(format!(
                            "recording holds {} samples, a cycle needs {}",
                            buffered, needed
                        ))
                        .into());
                    }
                    log::debug!("Buffered {}/{} samples", buffered, needed);
                }
                LivePoll::NoSignal(err) => {
                    if final_pass {
                        return Err(err.into());
                    }
                    log::info!("No payload yet: {}", err);
                }
            }
        }
    }
}
