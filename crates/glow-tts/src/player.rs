//! Audio playback on a dedicated OS thread, since rodio's `OutputStream` and
//! `Sink` are `!Send`. Commands flow through a channel to that thread, which
//! gives play/pause/resume/stop a natural serialization point without a
//! lock around the sink itself — only one command is ever in flight.
//!
//! Position and playing-state are read far more often than they change, so
//! they're published as lock-free atomics from the playback thread instead
//! of round-tripping through the command channel.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glow_tts_core::audio::{Audio, AudioFormat, SampleFormat};
use glow_tts_core::error::TtsError;
use rodio::{OutputStream, Sink, Source};
use tracing::error;

enum PlayerCmd {
    Play(Audio),
    Pause,
    Resume,
    Stop,
}

#[derive(Clone)]
struct Position {
    frames_played: Arc<AtomicU64>,
    is_playing: Arc<AtomicBool>,
    sample_rate: Arc<AtomicU64>,
}

/// Handle to the playback thread. Cloning shares the same underlying thread
/// and position counters.
pub struct Player {
    cmd_tx: std::sync::mpsc::Sender<PlayerCmd>,
    position: Position,
    _thread: std::thread::JoinHandle<()>,
}

impl Player {
    pub fn new() -> Result<Self, TtsError> {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel::<PlayerCmd>();
        let position = Position {
            frames_played: Arc::new(AtomicU64::new(0)),
            is_playing: Arc::new(AtomicBool::new(false)),
            sample_rate: Arc::new(AtomicU64::new(1)),
        };

        let thread_position = position.clone();
        let thread = std::thread::Builder::new()
            .name("glow-tts-playback".into())
            .spawn(move || playback_thread(cmd_rx, thread_position))
            .map_err(|e| TtsError::AudioDeviceError(e.to_string()))?;

        Ok(Self { cmd_tx, position, _thread: thread })
    }

    pub fn play(&self, audio: Audio) -> Result<(), TtsError> {
        self.position.sample_rate.store(audio.format().sample_rate as u64, Ordering::SeqCst);
        self.position.frames_played.store(0, Ordering::SeqCst);
        self.cmd_tx
            .send(PlayerCmd::Play(audio))
            .map_err(|_| TtsError::AudioDeviceError("playback thread is gone".into()))
    }

    pub fn pause(&self) -> Result<(), TtsError> {
        self.cmd_tx
            .send(PlayerCmd::Pause)
            .map_err(|_| TtsError::AudioDeviceError("playback thread is gone".into()))
    }

    pub fn resume(&self) -> Result<(), TtsError> {
        self.cmd_tx
            .send(PlayerCmd::Resume)
            .map_err(|_| TtsError::AudioDeviceError("playback thread is gone".into()))
    }

    pub fn stop(&self) -> Result<(), TtsError> {
        self.cmd_tx
            .send(PlayerCmd::Stop)
            .map_err(|_| TtsError::AudioDeviceError("playback thread is gone".into()))
    }

    /// Elapsed playback position within the currently playing clip.
    pub fn position(&self) -> Duration {
        let frames = self.position.frames_played.load(Ordering::SeqCst);
        let rate = self.position.sample_rate.load(Ordering::SeqCst).max(1);
        Duration::from_secs_f64(frames as f64 / rate as f64)
    }

    pub fn is_playing(&self) -> bool {
        self.position.is_playing.load(Ordering::SeqCst)
    }
}

fn playback_thread(cmd_rx: std::sync::mpsc::Receiver<PlayerCmd>, position: Position) {
    let (_stream, stream_handle) = match OutputStream::try_default() {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "playback: failed to open audio output device");
            return;
        }
    };

    let mut sink = match Sink::try_new(&stream_handle) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "playback: failed to create sink");
            return;
        }
    };

    loop {
        if sink.empty() {
            position.is_playing.store(false, Ordering::SeqCst);
        }

        match cmd_rx.recv() {
            Ok(PlayerCmd::Play(audio)) => {
                let source = PcmSource::new(audio, position.frames_played.clone());
                sink.append(source);
                sink.play();
                position.is_playing.store(true, Ordering::SeqCst);
            }
            Ok(PlayerCmd::Pause) => {
                sink.pause();
                position.is_playing.store(false, Ordering::SeqCst);
            }
            Ok(PlayerCmd::Resume) => {
                sink.play();
                position.is_playing.store(true, Ordering::SeqCst);
            }
            Ok(PlayerCmd::Stop) => {
                sink.stop();
                sink = match Sink::try_new(&stream_handle) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "playback: failed to recreate sink after stop");
                        return;
                    }
                };
                position.frames_played.store(0, Ordering::SeqCst);
                position.is_playing.store(false, Ordering::SeqCst);
            }
            Err(_) => {
                sink.stop();
                break;
            }
        }
    }
}

/// A rodio `Source` over a fully-materialized [`Audio`] buffer. Holds a
/// strong, owning `Arc` clone of the audio bytes for as long as the source
/// itself is alive, so the sink never outlives the data it's reading.
/// Converts float32 PCM to i16 with a saturating clamp, since rodio's `Sink`
/// plays a single sample type at a time and the rest of this crate treats
/// i16 as the common playback format.
struct PcmSource {
    audio: Audio,
    format: AudioFormat,
    sample_index: usize,
    frames_played: Arc<AtomicU64>,
}

impl PcmSource {
    fn new(audio: Audio, frames_played: Arc<AtomicU64>) -> Self {
        let format = audio.format();
        Self { audio, format, sample_index: 0, frames_played }
    }

    fn frame_count(&self) -> usize {
        let channels = self.format.channels.max(1) as usize;
        let bytes_per_sample = self.format.bytes_per_sample();
        let frame_bytes = bytes_per_sample * channels;
        if frame_bytes == 0 {
            0
        } else {
            self.audio.len() / frame_bytes
        }
    }

    fn total_samples(&self) -> usize {
        self.frame_count() * self.format.channels.max(1) as usize
    }

    fn sample_at(&self, sample_index: usize) -> Option<i16> {
        let bytes = self.audio.bytes();
        match self.format.sample_format {
            SampleFormat::Signed16Le => {
                let offset = sample_index * 2;
                let chunk = bytes.get(offset..offset + 2)?;
                Some(i16::from_le_bytes([chunk[0], chunk[1]]))
            }
            SampleFormat::Float32 => {
                let offset = sample_index * 4;
                let chunk = bytes.get(offset..offset + 4)?;
                let f = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                Some(float_to_i16(f))
            }
        }
    }
}

fn float_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

impl Iterator for PcmSource {
    type Item = i16;

    fn next(&mut self) -> Option<i16> {
        let channels = self.format.channels.max(1) as usize;
        if self.sample_index >= self.total_samples() {
            return None;
        }

        let within_frame = self.sample_index % channels;
        let sample = self.sample_at(self.sample_index)?;
        self.sample_index += 1;

        if within_frame == channels - 1 {
            self.frames_played.fetch_add(1, Ordering::SeqCst);
        }
        Some(sample)
    }
}

impl Source for PcmSource {
    fn current_frame_len(&self) -> Option<usize> {
        Some(self.total_samples().saturating_sub(self.sample_index))
    }

    fn channels(&self) -> u16 {
        self.format.channels
    }

    fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.audio.duration())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio_i16(samples: &[i16]) -> Audio {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Audio::new(
            bytes,
            AudioFormat {
                sample_rate: 8_000,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        )
    }

    #[test]
    fn pcm_source_yields_exact_i16_samples() {
        let audio = audio_i16(&[1, -2, 3, -4]);
        let frames = Arc::new(AtomicU64::new(0));
        let source = PcmSource::new(audio, frames.clone());
        let samples: Vec<i16> = source.collect();
        assert_eq!(samples, vec![1, -2, 3, -4]);
        assert_eq!(frames.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn float_to_i16_clamps_out_of_range() {
        assert_eq!(float_to_i16(2.0), i16::MAX);
        assert_eq!(float_to_i16(-2.0), -(i16::MAX));
    }

    #[test]
    fn float_source_converts_samples() {
        let mut bytes = Vec::new();
        for f in [0.5f32, -0.5, 1.0, -1.0] {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        let audio = Audio::new(
            bytes,
            AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                sample_format: SampleFormat::Float32,
            },
        );
        let frames = Arc::new(AtomicU64::new(0));
        let source = PcmSource::new(audio, frames);
        let samples: Vec<i16> = source.collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[2], i16::MAX);
    }

    #[test]
    fn reports_source_format() {
        let audio = audio_i16(&[0, 0]);
        let frames = Arc::new(AtomicU64::new(0));
        let source = PcmSource::new(audio, frames);
        assert_eq!(source.channels(), 1);
        assert_eq!(source.sample_rate(), 8_000);
    }
}
