//! Audio capture from microphone
//!
//! Pulls audio from the default input device at 16kHz mono, slices the
//! device callback stream into fixed 4096-sample frames, and forwards each
//! frame downstream without ever blocking the audio callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::{mpsc, watch};

use crate::voice::{AudioFrame, CaptureSource, FRAME_SIZE, INPUT_SAMPLE_RATE};
use crate::{Error, Result};

/// Outbound frame queue depth; a full queue drops frames rather than
/// stalling the device callback
const FRAME_QUEUE_DEPTH: usize = 32;

/// Captures audio from the default input device
pub struct AudioCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    frame_rx: Option<mpsc::Receiver<AudioFrame>>,
    level_tx: watch::Sender<f32>,
    dropped: Arc<AtomicU64>,
}

impl AudioCapture {
    /// Create a new audio capture instance
    ///
    /// Discovers the default input device and negotiates 16kHz mono; the
    /// input stream itself is not opened until [`CaptureSource::start`].
    ///
    /// # Errors
    ///
    /// Returns an error if no input device is available or none supports
    /// the capture format.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(INPUT_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(INPUT_SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Audio("no suitable capture config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(INPUT_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = INPUT_SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        let (level_tx, _) = watch::channel(0.0);

        Ok(Self {
            device,
            config,
            stream: None,
            frame_rx: None,
            level_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Frames dropped because the outbound queue was full
    #[must_use]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl CaptureSource for AudioCapture {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let level_tx = self.level_tx.clone();
        let dropped = Arc::clone(&self.dropped);

        let mut pending: Vec<f32> = Vec::with_capacity(FRAME_SIZE);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for &sample in data {
                        pending.push(sample);
                        if pending.len() < FRAME_SIZE {
                            continue;
                        }

                        let frame = AudioFrame::new(std::mem::replace(
                            &mut pending,
                            Vec::with_capacity(FRAME_SIZE),
                        ));
                        level_tx.send_replace(frame.rms());

                        // never block the audio callback on a slow consumer
                        if frame_tx.try_send(frame).is_err() {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        self.frame_rx = Some(frame_rx);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            self.level_tx.send_replace(0.0);
            tracing::debug!(
                dropped = self.dropped.load(Ordering::Relaxed),
                "audio capture stopped"
            );
        }
    }

    fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frame_rx.take()
    }

    fn level(&self) -> watch::Receiver<f32> {
        self.level_tx.subscribe()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns an error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
