use std::io::Write as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing_subscriber::EnvFilter;

use prism_studio::voice::samples_to_wav;
use prism_studio::{
    AudioCapture, AudioPlayback, CaptureSource, Config, INPUT_SAMPLE_RATE, LoopbackTransport,
    OUTPUT_SAMPLE_RATE, PlaybackChunk, PlaybackScheduler, PlaybackSink, SessionController,
};

/// Prism - real-time voice pipeline for a multi-modal AI studio
#[derive(Parser)]
#[command(name = "prism", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a live voice session against the loopback echo transport
    Live {
        /// Quiet period before your speech is echoed back, in milliseconds
        #[arg(long, env = "PRISM_ECHO_DELAY_MS", default_value = "600")]
        echo_delay_ms: u64,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Record the microphone to a WAV file
    Record {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Output path
        #[arg(short, long, default_value = "capture.wav")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,prism_studio=info",
        1 => "info,prism_studio=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Some(Command::TestMic { duration }) => test_mic(duration).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::Record { duration, output }) => record(duration, &output).await,
        Some(Command::Live { echo_delay_ms }) => live(echo_delay_ms).await,
        None => live(600).await,
    }
}

/// Run a live session until interrupted
#[allow(clippy::future_not_send)]
async fn live(echo_delay_ms: u64) -> anyhow::Result<()> {
    let config = Config::load()?;

    let scheduler = PlaybackScheduler::new();
    let capture = AudioCapture::new()?;
    let playback = AudioPlayback::new(scheduler.clone())?;
    let transport = LoopbackTransport::new(Duration::from_millis(echo_delay_ms));

    let mut controller = SessionController::new(
        config.live,
        Box::new(transport),
        Box::new(capture),
        Box::new(playback),
        scheduler,
    );

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    controller.start().await?;

    println!("Speak into your microphone; your voice echoes back after a pause.");
    println!("Press Ctrl-C to end the session.\n");

    // live loudness meter, one update per captured frame
    let mut level = controller.level();
    let meter = tokio::spawn(async move {
        while level.changed().await.is_ok() {
            let value = *level.borrow_and_update();
            print!("\r{}", level_meter(value));
            let _ = std::io::stdout().flush();
        }
    });

    let result = controller.run(&mut shutdown_rx).await;
    meter.abort();
    println!();

    result?;
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    let mut frames = capture
        .take_frames()
        .ok_or_else(|| anyhow::anyhow!("capture produced no frame stream"))?;

    println!("Sample rate: {INPUT_SAMPLE_RATE} Hz");
    println!("---");

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut peak = 0.0f32;
    let mut frame_count = 0u64;

    while Instant::now() < deadline {
        match timeout(Duration::from_secs(1), frames.recv()).await {
            Ok(Some(frame)) => {
                let energy = frame.rms();
                peak = peak.max(energy);
                frame_count += 1;
                print!("\rRMS: {energy:.4} | {}", level_meter(energy));
                let _ = std::io::stdout().flush();
            }
            Ok(None) => break,
            Err(_) => {
                print!("\r(no audio arriving)");
                let _ = std::io::stdout().flush();
            }
        }
    }

    capture.stop();

    println!("\n---");
    println!("Captured {frame_count} frames, peak RMS {peak:.4}");
    if peak < 0.001 {
        println!("RMS stayed near 0 - check that your mic is plugged in and not muted.");
    } else {
        println!("If you saw movement in the meter, your mic is working!");
    }

    Ok(())
}

/// Test speaker output with a sine tone played through the scheduler
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let scheduler = PlaybackScheduler::new();
    let mut playback = AudioPlayback::new(scheduler.clone())?;

    // enqueue the tone as consecutive quarter-second chunks; the scheduler
    // chains them with no audible seam
    let chunk_samples = OUTPUT_SAMPLE_RATE as usize / 4;
    let tone = sine_tone(440.0, 2.0, 0.3);
    for part in tone.chunks(chunk_samples) {
        scheduler.enqueue(
            PlaybackChunk::new(part.to_vec(), OUTPUT_SAMPLE_RATE),
            scheduler.clock(),
        )?;
    }

    playback.start()?;
    tokio::time::sleep(Duration::from_millis(2300)).await;
    playback.stop();

    println!("If you heard the tone, your speakers are working!");
    Ok(())
}

/// Record the microphone to a WAV file
#[allow(clippy::future_not_send, clippy::cast_precision_loss)]
async fn record(duration: u64, output: &std::path::Path) -> anyhow::Result<()> {
    println!("Recording for {duration} seconds to {}...", output.display());

    let mut capture = AudioCapture::new()?;
    capture.start()?;
    let mut frames = capture
        .take_frames()
        .ok_or_else(|| anyhow::anyhow!("capture produced no frame stream"))?;

    let deadline = Instant::now() + Duration::from_secs(duration);
    let mut samples = Vec::new();

    while Instant::now() < deadline {
        match timeout(Duration::from_secs(1), frames.recv()).await {
            Ok(Some(frame)) => samples.extend_from_slice(&frame.samples),
            Ok(None) => break,
            Err(_) => {}
        }
    }

    capture.stop();

    let wav = samples_to_wav(&samples, INPUT_SAMPLE_RATE)?;
    std::fs::write(output, wav)?;

    println!(
        "Wrote {} samples ({:.1}s) to {}",
        samples.len(),
        samples.len() as f64 / f64::from(INPUT_SAMPLE_RATE),
        output.display()
    );
    Ok(())
}

/// Render a loudness value as a fixed-width bar
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn level_meter(value: f32) -> String {
    let len = ((value * 100.0).min(40.0)) as usize;
    format!("[{}{}]", "█".repeat(len), " ".repeat(40 - len))
}

/// Generate a sine tone at the playback rate
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sine_tone(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (OUTPUT_SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / OUTPUT_SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}
