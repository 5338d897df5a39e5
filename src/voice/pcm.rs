//! PCM wire codec
//!
//! The remote session speaks raw 16-bit little-endian PCM wrapped in a
//! base64 text envelope. Capture frames are encoded here on the way out;
//! inbound payloads are decoded back to normalized floats for playback.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::voice::INPUT_SAMPLE_RATE;
use crate::{Error, Result};

/// An encoded audio payload plus its declared format
///
/// Owned transiently by the transport call; nothing here is buffered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    /// 16-bit little-endian PCM bytes
    pub data: Vec<u8>,

    /// Declared sample rate of the payload
    pub sample_rate: u32,

    /// MIME-style format tag (e.g. `audio/pcm;rate=16000`)
    pub mime_type: String,
}

impl EncodedChunk {
    /// Base64 wire representation of the payload
    #[must_use]
    pub fn to_transport(&self) -> String {
        encode_transport(&self.data)
    }
}

/// Pack normalized float samples as 16-bit little-endian PCM bytes.
///
/// Samples are expected pre-clamped to `-1.0..1.0`; out-of-range values
/// saturate at the 16-bit extremes rather than wrapping.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut data = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // `as` saturates, so +1.0 lands on 32767 and -1.0 on -32768
        let value = (sample * 32768.0) as i16;
        data.extend_from_slice(&value.to_le_bytes());
    }
    data
}

/// Encode a captured frame as a 16-bit PCM chunk at the capture rate.
#[must_use]
pub fn encode_frame(samples: &[f32]) -> EncodedChunk {
    EncodedChunk {
        data: samples_to_pcm16(samples),
        sample_rate: INPUT_SAMPLE_RATE,
        mime_type: format!("audio/pcm;rate={INPUT_SAMPLE_RATE}"),
    }
}

/// Decode a 16-bit little-endian PCM payload to normalized float samples.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the payload length is odd and therefore
/// cannot be reinterpreted as 16-bit samples.
pub fn decode_chunk(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Codec(format!(
            "invalid PCM16 data length: {} (must be even)",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32768.0)
        .collect())
}

/// Encode binary audio as transport-safe base64 text.
#[must_use]
pub fn encode_transport(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 transport payload back to bytes.
///
/// # Errors
///
/// Returns [`Error::Codec`] if the input is not valid base64.
pub fn decode_transport(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| Error::Codec(format!("invalid base64 audio: {e}")))
}
