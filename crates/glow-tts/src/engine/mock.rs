//! A deterministic, zero-dependency engine used by tests and by callers
//! exercising the pipeline without real TTS binaries installed.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use glow_tts_core::audio::{Audio, AudioFormat, SampleFormat};
use glow_tts_core::error::TtsError;

use super::{EngineInfo, SynthesisEngine};

const SAMPLE_RATE: u32 = 16_000;

/// Produces silence of a duration derived from the input text's length.
/// Can be told to fail on demand, to drive fallback-promotion tests.
#[derive(Debug, Default)]
pub struct MockEngine {
    fail: AtomicBool,
    calls: AtomicU64,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    async fn synthesize(&self, text: &str, speed: f64) -> Result<Audio, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(TtsError::EngineUnavailable("mock engine configured to fail".into()));
        }

        let speed = speed.max(0.01);
        let char_count = text.chars().count().max(1) as f64;
        // ~80ms per character at 1.0x, scaled by speed; purely illustrative.
        let seconds = (char_count * 0.08 / speed).max(0.05);
        let sample_count = (seconds * SAMPLE_RATE as f64) as usize;
        let bytes = vec![0u8; sample_count * 2];

        Ok(Audio::new(
            bytes,
            AudioFormat {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        ))
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "mock",
            sample_rate: SAMPLE_RATE,
            channels: 1,
            bit_depth: 16,
            max_text_len: 10_000,
            online: false,
        }
    }

    async fn validate(&self) -> Result<(), TtsError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longer_text_produces_longer_audio() {
        let engine = MockEngine::new();
        let short = engine.synthesize("hi", 1.0).await.unwrap();
        let long = engine.synthesize("hello there, this is longer", 1.0).await.unwrap();
        assert!(long.duration() > short.duration());
    }

    #[tokio::test]
    async fn higher_speed_produces_shorter_audio() {
        let engine = MockEngine::new();
        let normal = engine.synthesize("hello world", 1.0).await.unwrap();
        let fast = engine.synthesize("hello world", 2.0).await.unwrap();
        assert!(fast.duration() < normal.duration());
    }

    #[tokio::test]
    async fn can_be_configured_to_fail() {
        let engine = MockEngine::new();
        engine.set_failing(true);
        let result = engine.synthesize("hello", 1.0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn validate_always_succeeds() {
        let engine = MockEngine::new();
        assert!(engine.validate().await.is_ok());
    }

    #[tokio::test]
    async fn every_nonempty_text_yields_positive_duration_and_bytes() {
        let engine = MockEngine::new();
        for text in ["a", "hello world", "A much longer sentence to synthesize."] {
            let audio = engine.synthesize(text, 1.0).await.unwrap();
            assert!(audio.duration().as_nanos() > 0);
            assert!(audio.len() > 0);
        }
    }
}
