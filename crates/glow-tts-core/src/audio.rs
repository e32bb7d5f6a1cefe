//! Audio data: an owned PCM buffer plus the format descriptor that gives it meaning.

use std::sync::Arc;
use std::time::Duration;

/// Sample encoding of a PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Signed 16-bit little-endian.
    Signed16Le,
    /// 32-bit IEEE float.
    Float32,
}

/// Describes the shape of a PCM buffer: how to interpret its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl AudioFormat {
    pub fn bytes_per_sample(&self) -> usize {
        match self.sample_format {
            SampleFormat::Signed16Le => 2,
            SampleFormat::Float32 => 4,
        }
    }

    /// Bytes consumed per second of audio at this format.
    pub fn bytes_per_second(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize * self.sample_rate as usize
    }
}

/// An owned, immutable PCM buffer produced by a synthesis engine.
///
/// `bytes` is `Arc`-backed so the player can clone a strong, owning handle
/// into its playback source without ever borrowing from a caller's stack —
/// see the player lifetime invariant in the design notes.
#[derive(Debug, Clone)]
pub struct Audio {
    bytes: Arc<[u8]>,
    format: AudioFormat,
    duration: Duration,
}

impl Audio {
    /// Build an `Audio` from raw bytes, computing duration from the format.
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        let duration = duration_from_bytes(bytes.len(), &format);
        Self {
            bytes: Arc::from(bytes),
            format,
            duration,
        }
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn duration_from_bytes(len: usize, format: &AudioFormat) -> Duration {
    let bps = format.bytes_per_second();
    if bps == 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(len as f64 / bps as f64)
}
