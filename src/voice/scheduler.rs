//! Gapless playback scheduling
//!
//! Decoded reply audio arrives in chunks that must play back-to-back with
//! no gap and no overlap, and must all stop instantly on barge-in. The
//! scheduler keeps a cursor (earliest time the next chunk may begin) and
//! the set of scheduled-but-unfinished sources; the output engine drains it
//! from the device render callback.

use std::sync::{Arc, Mutex, PoisonError};

use crate::voice::OUTPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// A decoded audio buffer awaiting playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackChunk {
    /// Normalized mono samples
    pub samples: Vec<f32>,

    /// Sample rate the buffer was decoded at
    pub sample_rate: u32,
}

impl PlaybackChunk {
    /// Create a chunk from decoded samples
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Duration of this chunk in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// A chunk that has been scheduled but not yet finished playing
#[derive(Debug)]
struct ScheduledSource {
    /// Scheduled start time on the output clock, seconds
    start: f64,

    /// Chunk duration, seconds
    duration: f64,

    /// Samples remaining to render, consumed front-to-back
    samples: Vec<f32>,

    /// Next sample index to render
    pos: usize,
}

#[derive(Debug, Default)]
struct SchedulerState {
    /// Earliest time the next chunk may begin, seconds
    cursor: f64,

    /// Scheduled-but-unfinished sources
    active: Vec<ScheduledSource>,

    /// Output frames rendered so far; the output clock is derived from this
    frames_rendered: u64,
}

/// Schedules decoded chunks for gapless, interruptible playback
///
/// Clones share one underlying state; `enqueue`, `interrupt`, and `render`
/// all mutate it under a single lock, so interruption is atomic with
/// respect to an in-flight enqueue.
#[derive(Debug, Clone)]
pub struct PlaybackScheduler {
    state: Arc<Mutex<SchedulerState>>,
    sample_rate: u32,
}

impl Default for PlaybackScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackScheduler {
    /// Create an empty scheduler at the output sample rate
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState::default())),
            sample_rate: OUTPUT_SAMPLE_RATE,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule a chunk to begin at the cursor or `now`, whichever is later.
    ///
    /// Consecutive chunks play in enqueue order with no gap while the
    /// producer keeps pace, and never overlap: the cursor only advances by
    /// the scheduled chunk's duration.
    ///
    /// Returns the start time the chunk was scheduled at.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty chunk or a sample-rate mismatch; a
    /// rejected chunk advances nothing and leaves the active set untouched.
    pub fn enqueue(&self, chunk: PlaybackChunk, now: f64) -> Result<f64> {
        if chunk.samples.is_empty() {
            return Err(Error::Audio("empty playback chunk".to_string()));
        }
        if chunk.sample_rate != self.sample_rate {
            return Err(Error::Audio(format!(
                "playback chunk at {} Hz, output runs at {} Hz",
                chunk.sample_rate, self.sample_rate
            )));
        }

        let duration = chunk.duration();
        let mut state = self.lock();
        let start = state.cursor.max(now);
        state.active.push(ScheduledSource {
            start,
            duration,
            samples: chunk.samples,
            pos: 0,
        });
        state.cursor = start + duration;

        tracing::trace!(start, duration, cursor = state.cursor, "chunk scheduled");
        Ok(start)
    }

    /// Stop every scheduled source immediately and reset the cursor to zero.
    ///
    /// Mid-sample cutoff is expected; the next enqueue starts at the
    /// caller's `now` rather than any stale future time. No-op when nothing
    /// is scheduled.
    pub fn interrupt(&self) {
        let mut state = self.lock();
        if !state.active.is_empty() {
            tracing::debug!(stopped = state.active.len(), "playback interrupted");
        }
        state.active.clear();
        state.cursor = 0.0;
    }

    /// Full reset: drop all sources and rewind cursor and clock to zero.
    ///
    /// Used on session teardown so a later session starts from a clean
    /// output timeline.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.active.clear();
        state.cursor = 0.0;
        state.frames_rendered = 0;
    }

    /// Current output-clock time in seconds, derived from rendered frames
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn clock(&self) -> f64 {
        self.lock().frames_rendered as f64 / f64::from(self.sample_rate)
    }

    /// Current cursor value in seconds
    #[must_use]
    pub fn cursor(&self) -> f64 {
        self.lock().cursor
    }

    /// Number of scheduled-but-unfinished sources
    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.lock().active.len()
    }

    /// Scheduled `[start, start + duration)` intervals of the active set
    #[must_use]
    pub fn active_intervals(&self) -> Vec<(f64, f64)> {
        self.lock()
            .active
            .iter()
            .map(|s| (s.start, s.start + s.duration))
            .collect()
    }

    /// Mix due sources into an interleaved output buffer and advance the
    /// output clock by the rendered frame count.
    ///
    /// The mono mix is duplicated across all `channels`. Sources whose
    /// start time has not been reached contribute silence; sources that
    /// finish are removed from the active set with no other side effect.
    #[allow(clippy::cast_precision_loss)]
    pub fn render(&self, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        if channels == 0 {
            return;
        }

        let rate = f64::from(self.sample_rate);
        let frames = out.len() / channels;
        let mut state = self.lock();
        let state = &mut *state;

        for i in 0..frames {
            let t = (state.frames_rendered + i as u64) as f64 / rate;
            let mut mixed = 0.0f32;
            for source in &mut state.active {
                if t >= source.start && source.pos < source.samples.len() {
                    mixed += source.samples[source.pos];
                    source.pos += 1;
                }
            }
            for channel in out[i * channels..(i + 1) * channels].iter_mut() {
                *channel = mixed;
            }
        }

        state.frames_rendered += frames as u64;
        state.active.retain(|s| s.pos < s.samples.len());
    }
}
