//! In-process echo transport
//!
//! Plays the caller's own speech back as the assistant reply: inbound
//! 16kHz utterances are end-pointed on a quiet period, resampled to the
//! 24kHz output rate, and emitted as reply audio. Fresh speech landing
//! while a reply should still be playing produces an `Interrupted` event,
//! approximating server-side barge-in detection. Lets the full pipeline
//! run end-to-end with no network and no API key.

use std::time::Duration;

use async_trait::async_trait;
use rubato::{FftFixedIn, Resampler};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};

use crate::config::LiveConfig;
use crate::live::{LiveSession, LiveTransport, SessionEvent};
use crate::voice::{self, EncodedChunk, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, pcm};
use crate::{Error, Result};

/// RMS threshold above which an inbound frame counts as speech
const SPEECH_THRESHOLD: f32 = 0.015;

/// Samples per emitted reply chunk (~0.2s at 24kHz)
const REPLY_CHUNK_SAMPLES: usize = 4800;

/// Resampler input block size
const RESAMPLE_CHUNK: usize = 1024;

/// Echoes caller audio back as reply audio after a quiet period
pub struct LoopbackTransport {
    quiet_period: Duration,
}

impl LoopbackTransport {
    /// Create a transport that replies after `quiet_period` without speech
    #[must_use]
    pub const fn new(quiet_period: Duration) -> Self {
        Self { quiet_period }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(600))
    }
}

#[async_trait]
impl LiveTransport for LoopbackTransport {
    async fn connect(
        &self,
        config: &LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (audio_tx, audio_rx) = mpsc::channel::<String>(64);

        tracing::info!(
            model = %config.model,
            voice = %config.voice,
            "loopback session opened"
        );

        tokio::spawn(echo_loop(audio_rx, event_tx, self.quiet_period));

        Ok((
            Box::new(LoopbackSession {
                audio_tx: Some(audio_tx),
            }),
            event_rx,
        ))
    }
}

struct LoopbackSession {
    audio_tx: Option<mpsc::Sender<String>>,
}

#[async_trait]
impl LiveSession for LoopbackSession {
    async fn send_audio(&mut self, chunk: &EncodedChunk) -> Result<()> {
        let tx = self
            .audio_tx
            .as_ref()
            .ok_or_else(|| Error::Transport("session closed".to_string()))?;

        tx.send(chunk.to_transport())
            .await
            .map_err(|_| Error::Transport("echo task ended".to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        // dropping the sender ends the echo task, which emits Closed
        self.audio_tx = None;
        Ok(())
    }
}

/// The echo task: buffer speech, end-point on quiet, replay resampled
async fn echo_loop(
    mut audio_rx: mpsc::Receiver<String>,
    event_tx: mpsc::Sender<SessionEvent>,
    quiet_period: Duration,
) {
    if event_tx.send(SessionEvent::Opened).await.is_err() {
        return;
    }

    let mut pending: Vec<f32> = Vec::new();
    let mut flush_at: Option<Instant> = None;
    let mut reply_until: Option<Instant> = None;

    loop {
        let deadline = flush_at.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            maybe_payload = audio_rx.recv() => {
                let Some(payload) = maybe_payload else { break };
                let samples = match pcm::decode_transport(&payload).and_then(|b| pcm::decode_chunk(&b)) {
                    Ok(samples) => samples,
                    Err(e) => {
                        tracing::warn!(error = %e, "loopback dropping malformed payload");
                        continue;
                    }
                };

                if voice::rms(&samples) < SPEECH_THRESHOLD {
                    continue;
                }

                // barge-in: fresh speech while the reply is still playing
                if reply_until.is_some_and(|t| Instant::now() < t) {
                    reply_until = None;
                    tracing::debug!("caller spoke over reply, interrupting");
                    if event_tx.send(SessionEvent::Interrupted).await.is_err() {
                        return;
                    }
                }

                pending.extend_from_slice(&samples);
                flush_at = Some(Instant::now() + quiet_period);
            }
            () = sleep_until(deadline), if flush_at.is_some() => {
                flush_at = None;
                let utterance = std::mem::take(&mut pending);

                match resample(&utterance, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE) {
                    Ok(reply) => {
                        #[allow(clippy::cast_precision_loss)]
                        let duration =
                            Duration::from_secs_f64(reply.len() as f64 / f64::from(OUTPUT_SAMPLE_RATE));
                        reply_until = Some(Instant::now() + duration);
                        tracing::debug!(
                            samples = reply.len(),
                            "echoing utterance as reply audio"
                        );

                        for chunk in reply.chunks(REPLY_CHUNK_SAMPLES) {
                            let bytes = pcm::samples_to_pcm16(chunk);
                            if event_tx.send(SessionEvent::Audio(bytes)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "loopback resample failed"),
                }
            }
        }
    }

    let _ = event_tx.send(SessionEvent::Closed).await;
    tracing::debug!("loopback session closed");
}

/// One-shot sample-rate conversion, zero-padding the final block
fn resample(samples: &[f32], from: u32, to: u32) -> Result<Vec<f32>> {
    if samples.is_empty() {
        return Ok(Vec::new());
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, RESAMPLE_CHUNK, 2, 1)
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

    let mut out = Vec::with_capacity(samples.len() * to as usize / from as usize + RESAMPLE_CHUNK);
    let mut pos = 0;
    while pos < samples.len() {
        let needed = resampler.input_frames_next();
        let mut block = vec![0.0f32; needed];
        let take = needed.min(samples.len() - pos);
        block[..take].copy_from_slice(&samples[pos..pos + take]);
        pos += take;

        let processed = resampler
            .process(&[block], None)
            .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
        out.extend_from_slice(&processed[0]);
    }

    Ok(out)
}
