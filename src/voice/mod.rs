//! Voice processing module
//!
//! Handles microphone capture, the PCM wire codec, and gapless scheduled
//! playback. The remote session that audio flows to and from lives behind
//! the transport seam in [`crate::live`].

pub mod capture;
pub mod pcm;
pub mod playback;
pub mod scheduler;

use tokio::sync::{mpsc, watch};

use crate::Result;

pub use capture::{AudioCapture, samples_to_wav};
pub use pcm::{
    EncodedChunk, decode_chunk, decode_transport, encode_frame, encode_transport, samples_to_pcm16,
};
pub use playback::AudioPlayback;
pub use scheduler::{PlaybackChunk, PlaybackScheduler};

/// Sample rate for microphone capture (16kHz for speech)
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate for playback (matches the remote session's audio output)
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Samples per captured frame (~256ms at 16kHz, one frame per callback)
pub const FRAME_SIZE: usize = 4096;

/// One fixed-size block of captured audio
///
/// Produced once per capture frame, consumed by the encoder, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Normalized mono samples in `-1.0..1.0`
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Create a frame from raw samples
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self { samples }
    }

    /// Root-mean-square loudness of this frame
    #[must_use]
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// A source of captured audio frames
///
/// Implemented by [`AudioCapture`] for real microphones; swappable so the
/// session controller can be driven without audio hardware.
pub trait CaptureSource {
    /// Begin producing frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the input device cannot be opened.
    fn start(&mut self) -> Result<()>;

    /// Stop producing frames and release the input device. Idempotent.
    fn stop(&mut self);

    /// Take the frame receiver for the current capture run.
    ///
    /// Returns `None` if capture has not started or the receiver was
    /// already taken.
    fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>>;

    /// Loudness feedback channel, updated once per captured frame.
    fn level(&self) -> watch::Receiver<f32>;
}

/// A sink that renders scheduled audio to an output device
pub trait PlaybackSink {
    /// Start rendering.
    ///
    /// # Errors
    ///
    /// Returns an error if the output device cannot be opened.
    fn start(&mut self) -> Result<()>;

    /// Stop rendering and release the output device. Idempotent.
    fn stop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_silence_is_zero() {
        let frame = AudioFrame::new(vec![0.0; FRAME_SIZE]);
        assert!(frame.rms() < f32::EPSILON);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert!(rms(&[]) < f32::EPSILON);
    }

    #[test]
    fn rms_of_constant_amplitude() {
        // RMS of a constant-magnitude signal equals that magnitude
        let frame = AudioFrame::new(vec![0.5, -0.5, 0.5, -0.5]);
        assert!((frame.rms() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn rms_tracks_energy() {
        let quiet = rms(&[0.01; 256]);
        let loud = rms(&[0.8; 256]);
        assert!(loud > quiet);
    }
}
