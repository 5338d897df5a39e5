//! Shared test utilities
//!
//! Audio generators plus hand-driven stand-ins for the capture source,
//! playback sink, and remote transport, so the pipeline can be exercised
//! without audio hardware or a network.

#![allow(dead_code)] // each integration suite uses a subset

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use prism_studio::voice::{AudioFrame, CaptureSource, PlaybackSink};
use prism_studio::{
    EncodedChunk, LiveConfig, LiveSession, LiveTransport, Result, SessionEvent,
};

/// Generate sine wave audio samples
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_sine_samples(rate: u32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (rate as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / rate as f32;
            amplitude * (2.0 * std::f32::consts::PI * 440.0 * t).sin()
        })
        .collect()
}

/// Generate silence
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn generate_silence(rate: u32, duration_secs: f32) -> Vec<f32> {
    let num_samples = (rate as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// A capture source fed by hand from the test body
pub struct ManualCapture {
    frame_rx: Option<mpsc::Receiver<AudioFrame>>,
    level_tx: watch::Sender<f32>,
    running: Arc<AtomicBool>,
}

impl ManualCapture {
    /// Returns the capture source, a sender for pushing frames into it,
    /// and a flag tracking whether it is running
    #[must_use]
    pub fn new() -> (Self, mpsc::Sender<AudioFrame>, Arc<AtomicBool>) {
        let (frame_tx, frame_rx) = mpsc::channel(32);
        let (level_tx, _) = watch::channel(0.0);
        let running = Arc::new(AtomicBool::new(false));

        (
            Self {
                frame_rx: Some(frame_rx),
                level_tx,
                running: Arc::clone(&running),
            },
            frame_tx,
            running,
        )
    }
}

impl CaptureSource for ManualCapture {
    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frame_rx.take()
    }

    fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }
}

/// A playback sink that renders nothing
pub struct NullSink {
    running: Arc<AtomicBool>,
}

impl NullSink {
    #[must_use]
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let running = Arc::new(AtomicBool::new(false));
        (
            Self {
                running: Arc::clone(&running),
            },
            running,
        )
    }
}

impl PlaybackSink for NullSink {
    fn start(&mut self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// A transport that replays pre-scripted event sequences
///
/// Each `connect` pops the next script and feeds it to the returned event
/// receiver from a background task; the channel stays open after the script
/// drains so the session only ends when the script says so (or on
/// teardown). Outbound audio and close calls are recorded for assertions.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<SessionEvent>>>,
    held_senders: Mutex<Vec<mpsc::Sender<SessionEvent>>>,
    pub connects: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<EncodedChunk>>>,
}

impl ScriptedTransport {
    /// Transport whose single connect replays `script`
    #[must_use]
    pub fn new(script: Vec<SessionEvent>) -> Self {
        Self::with_scripts(vec![script])
    }

    /// Transport serving one script per connect, in order
    #[must_use]
    pub fn with_scripts(scripts: Vec<Vec<SessionEvent>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            held_senders: Mutex::new(Vec::new()),
            connects: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl LiveTransport for ScriptedTransport {
    async fn connect(
        &self,
        _config: &LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("no script left for connect");

        let (event_tx, event_rx) = mpsc::channel(64);
        self.held_senders.lock().unwrap().push(event_tx.clone());

        tokio::spawn(async move {
            for event in script {
                if event_tx.send(event).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        Ok((
            Box::new(ScriptedSession {
                sent: Arc::clone(&self.sent),
                closes: Arc::clone(&self.closes),
            }),
            event_rx,
        ))
    }
}

struct ScriptedSession {
    sent: Arc<Mutex<Vec<EncodedChunk>>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl LiveSession for ScriptedSession {
    async fn send_audio(&mut self, chunk: &EncodedChunk) -> Result<()> {
        self.sent.lock().unwrap().push(chunk.clone());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
