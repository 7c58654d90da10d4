//! Inbound audio chunks and their decoded PCM form.

use crate::error::{SessionError, SessionResult};
use base64::{Engine, engine::general_purpose};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// An encoded audio payload pushed by the streaming service.
///
/// `data` is base64 text wrapping little-endian, interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioChunk {
    /// Base64-encoded PCM bytes
    pub data: String,
    /// Content type announced by the service, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl AudioChunk {
    /// Wrap already base64-encoded data
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: None,
        }
    }

    /// Encode interleaved 16-bit samples into a chunk
    pub fn from_pcm16(samples: &[i16]) -> Self {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(general_purpose::STANDARD.encode(bytes))
    }
}

/// Decoded audio, one row per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Array2<f32>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Wrap planar samples (`channels x frames`) at the given rate
    pub const fn new(samples: Array2<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A buffer of `frames` zero samples
    pub fn silence(channels: usize, frames: usize, sample_rate: u32) -> Self {
        Self::new(Array2::zeros((channels, frames)), sample_rate)
    }

    /// Number of channels
    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.samples.ncols()
    }

    /// Sample rate in Hz
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Sample of `channel` at `frame`, or silence when out of range
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        self.samples.get((channel, frame)).copied().unwrap_or(0.0)
    }

    /// Planar sample view
    pub const fn samples(&self) -> &Array2<f32> {
        &self.samples
    }
}

/// Decode a chunk into a planar `f32` buffer at the engine format.
pub fn decode_chunk(chunk: &AudioChunk, sample_rate: u32, channels: usize) -> SessionResult<PcmBuffer> {
    if channels == 0 {
        return Err(SessionError::decode("channel count must be > 0"));
    }

    let bytes = general_purpose::STANDARD
        .decode(chunk.data.as_bytes())
        .map_err(|e| SessionError::decode(format!("invalid base64 payload: {e}")))?;

    if bytes.len() % 2 != 0 {
        return Err(SessionError::decode(format!(
            "payload of {} bytes is not 16-bit aligned",
            bytes.len()
        )));
    }

    let samples: Vec<i16> = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    if samples.len() % channels != 0 {
        return Err(SessionError::decode(format!(
            "{} samples do not divide into {} channels",
            samples.len(),
            channels
        )));
    }

    let frames = samples.len() / channels;
    let planar = Array2::from_shape_fn((channels, frames), |(ch, frame)| {
        f32::from(samples[frame * channels + ch]) / 32768.0
    });

    Ok(PcmBuffer::new(planar, sample_rate))
}
