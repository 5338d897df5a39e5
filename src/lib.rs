//! Prism Studio - real-time voice pipeline for a multi-modal AI studio
//!
//! This library provides the duplex voice core of the studio:
//! - Microphone capture in fixed frames with loudness feedback
//! - PCM wire codec (16-bit LE + base64 transport text)
//! - Gapless, interruptible playback scheduling
//! - A session controller owning the conversation lifecycle
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Caller UI                       │
//! │     start/stop  │  loudness meter  │  error surface  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Session Controller                    │
//! │  Capture ──► PCM encode ──► transport ──► remote    │
//! │  Playback ◄── scheduler ◄── PCM decode ◄── remote   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │          Remote streaming session (opaque)           │
//! │   open │ audio chunks │ barge-in │ close │ error    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! The request/response media panels of the studio (image, video, chat) are
//! thin API glue and live outside this crate.

pub mod config;
pub mod error;
pub mod live;
pub mod voice;

pub use config::{Config, LiveConfig};
pub use error::{Error, Result};
pub use live::{
    LiveSession, LiveTransport, LoopbackTransport, SessionController, SessionEvent, SessionState,
};
pub use voice::{
    AudioCapture, AudioFrame, AudioPlayback, CaptureSource, EncodedChunk, FRAME_SIZE,
    INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE, PlaybackChunk, PlaybackScheduler, PlaybackSink,
};
