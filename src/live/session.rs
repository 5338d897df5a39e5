//! Live session controller
//!
//! Owns the conversation lifecycle: it is the only component that sees both
//! directions of the pipeline. Captured frames flow out through the remote
//! session; reply audio flows back into the playback scheduler; a remote
//! barge-in signal cuts local playback in lockstep. Capture callbacks,
//! playback rendering, and transport events are independent sources, so all
//! coordination happens in one `select!` loop over their channels.

use tokio::sync::{mpsc, watch};

use crate::config::LiveConfig;
use crate::live::{LiveSession, LiveTransport, SessionEvent};
use crate::voice::{
    AudioFrame, CaptureSource, OUTPUT_SAMPLE_RATE, PlaybackChunk, PlaybackScheduler, PlaybackSink,
    pcm,
};
use crate::{Error, Result};

/// Lifecycle state of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; ready to start
    Idle,
    /// Remote session being established
    Connecting,
    /// Duplex audio flowing
    Streaming,
    /// Teardown in progress
    Closing,
    /// Closed normally; ready to start again
    Closed,
    /// Failed; ready to start again after the caller surfaces the error
    Errored,
}

/// What the drive loop should do after a transport event
enum Flow {
    Continue,
    Stop,
    Fail(String),
}

/// Coordinates capture, transport, and playback for one conversation
pub struct SessionController {
    config: LiveConfig,
    state: SessionState,
    transport: Box<dyn LiveTransport>,
    capture: Box<dyn CaptureSource>,
    playback: Box<dyn PlaybackSink>,
    scheduler: PlaybackScheduler,
    session: Option<Box<dyn LiveSession>>,
    events: Option<mpsc::Receiver<SessionEvent>>,
}

impl SessionController {
    /// Create an idle controller over the given components
    pub fn new(
        config: LiveConfig,
        transport: Box<dyn LiveTransport>,
        capture: Box<dyn CaptureSource>,
        playback: Box<dyn PlaybackSink>,
        scheduler: PlaybackScheduler,
    ) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            transport,
            capture,
            playback,
            scheduler,
            session: None,
            events: None,
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Loudness feedback for caller-side visualization, updated at frame
    /// cadence
    #[must_use]
    pub fn level(&self) -> watch::Receiver<f32> {
        self.capture.level()
    }

    /// Handle on the playback scheduler
    #[must_use]
    pub fn scheduler(&self) -> PlaybackScheduler {
        self.scheduler.clone()
    }

    /// Open the remote session and begin streaming.
    ///
    /// No-op if a session is already connecting or streaming. Capture does
    /// not start until the remote confirms readiness, so no audio is read
    /// from the microphone before then.
    ///
    /// # Errors
    ///
    /// Returns an error if the remote session or either audio device could
    /// not be brought up; the controller lands in [`SessionState::Errored`]
    /// with everything released.
    pub async fn start(&mut self) -> Result<()> {
        if !matches!(
            self.state,
            SessionState::Idle | SessionState::Closed | SessionState::Errored
        ) {
            tracing::debug!(state = ?self.state, "start ignored, session already active");
            return Ok(());
        }

        self.state = SessionState::Connecting;
        tracing::info!(model = %self.config.model, "opening live session");

        let (session, mut events) = match self.transport.connect(&self.config).await {
            Ok(pair) => pair,
            Err(e) => {
                self.fail().await;
                return Err(e);
            }
        };

        // streaming begins only once the remote confirms readiness
        match events.recv().await {
            Some(SessionEvent::Opened) => {}
            Some(SessionEvent::Error(msg)) => {
                self.fail().await;
                return Err(Error::Transport(msg));
            }
            _ => {
                self.fail().await;
                return Err(Error::Transport(
                    "session closed before opening".to_string(),
                ));
            }
        }

        self.session = Some(session);
        self.events = Some(events);

        if let Err(e) = self.capture.start() {
            self.fail().await;
            return Err(e);
        }
        if let Err(e) = self.playback.start() {
            self.fail().await;
            return Err(e);
        }

        self.state = SessionState::Streaming;
        tracing::info!("live session streaming");
        Ok(())
    }

    /// Drive the streaming session until shutdown, remote close, or a
    /// transport error.
    ///
    /// # Errors
    ///
    /// Returns an error if called while not streaming, or when the remote
    /// session fails; per-chunk problems (bad decode, failed send) are
    /// logged and survived.
    pub async fn run(&mut self, shutdown: &mut mpsc::Receiver<()>) -> Result<()> {
        if self.state != SessionState::Streaming {
            return Err(Error::Session("run called while not streaming".to_string()));
        }

        let mut frames = self
            .capture
            .take_frames()
            .ok_or_else(|| Error::Session("capture frames already taken".to_string()))?;
        let mut events = self
            .events
            .take()
            .ok_or_else(|| Error::Session("event stream already taken".to_string()))?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                maybe_frame = frames.recv() => match maybe_frame {
                    Some(frame) => self.forward_frame(frame).await,
                    None => {
                        tracing::debug!("capture stream ended");
                        break;
                    }
                },
                maybe_event = events.recv() => {
                    match maybe_event.map_or(Flow::Stop, |ev| self.handle_event(ev)) {
                        Flow::Continue => {}
                        Flow::Stop => break,
                        Flow::Fail(msg) => {
                            tracing::error!(error = %msg, "remote session failed");
                            self.fail().await;
                            return Err(Error::Transport(msg));
                        }
                    }
                }
            }
        }

        self.stop().await
    }

    /// Stop streaming and release every resource.
    ///
    /// Safe to call from any state, any number of times; calls after the
    /// first are no-ops. Stopping an idle controller leaves it idle.
    ///
    /// # Errors
    ///
    /// Infallible today; the signature leaves room for transports whose
    /// close handshake can fail.
    pub async fn stop(&mut self) -> Result<()> {
        match self.state {
            SessionState::Idle
            | SessionState::Closing
            | SessionState::Closed
            | SessionState::Errored => return Ok(()),
            SessionState::Connecting | SessionState::Streaming => {}
        }

        self.state = SessionState::Closing;
        self.teardown().await;
        self.state = SessionState::Closed;
        tracing::info!("live session closed");
        Ok(())
    }

    /// React to one transport event while streaming
    fn handle_event(&mut self, event: SessionEvent) -> Flow {
        match event {
            // readiness was already confirmed during start
            SessionEvent::Opened => Flow::Continue,
            SessionEvent::Audio(bytes) => {
                self.on_audio(&bytes);
                Flow::Continue
            }
            SessionEvent::Interrupted => {
                tracing::debug!("remote barge-in, cutting playback");
                self.scheduler.interrupt();
                Flow::Continue
            }
            SessionEvent::Closed => Flow::Stop,
            SessionEvent::Error(msg) => Flow::Fail(msg),
        }
    }

    /// Decode one reply chunk and hand it to the scheduler
    fn on_audio(&mut self, bytes: &[u8]) {
        let samples = match pcm::decode_chunk(bytes) {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => {
                tracing::warn!("dropping empty reply chunk");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable reply chunk");
                return;
            }
        };

        let chunk = PlaybackChunk::new(samples, OUTPUT_SAMPLE_RATE);
        let now = self.scheduler.clock();
        if let Err(e) = self.scheduler.enqueue(chunk, now) {
            tracing::warn!(error = %e, "dropping unschedulable reply chunk");
        }
    }

    /// Encode one captured frame and send it, best-effort
    async fn forward_frame(&mut self, frame: AudioFrame) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let chunk = pcm::encode_frame(&frame.samples);
        if let Err(e) = session.send_audio(&chunk).await {
            // capture keeps running; a dead transport surfaces as an
            // error or close event instead
            tracing::warn!(error = %e, "outbound audio send failed");
        }
    }

    /// Error-path teardown
    async fn fail(&mut self) {
        self.teardown().await;
        self.state = SessionState::Errored;
    }

    /// Release capture, remote session, playback, and scheduler state
    async fn teardown(&mut self) {
        self.capture.stop();

        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::warn!(error = %e, "error closing remote session");
            }
        }
        self.events = None;

        self.playback.stop();
        self.scheduler.reset();
    }
}
