//! Synthesis engine port: the contract every TTS backend implements.
//!
//! Modeled on the pack's `VoicePipelinePort` port-trait convention: an
//! `async_trait` with `Send + Sync` so instances can live behind
//! `Arc<dyn SynthesisEngine>`.

pub mod fallback;
pub mod gtts;
pub mod mock;
pub mod piper;

use async_trait::async_trait;
use glow_tts_core::audio::Audio;
use glow_tts_core::error::TtsError;
use glow_tts_core::state::TtsEvent;

/// Static descriptor of a synthesis engine's output format and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInfo {
    pub name: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
    pub max_text_len: usize,
    pub online: bool,
}

/// A text-to-speech backend. `speed` is a multiplier in `[0.5, 2.0]`.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    async fn synthesize(&self, text: &str, speed: f64) -> Result<Audio, TtsError>;

    fn info(&self) -> EngineInfo;

    /// Startup health check; called once before the controller transitions
    /// out of `Initializing`.
    async fn validate(&self) -> Result<(), TtsError>;

    /// Drains engine-level events accumulated since the last call (e.g. a
    /// fallback promotion). Polled by the lookahead queue's worker loop
    /// after every `synthesize` call and forwarded onto the event stream.
    /// Most engines never have anything to report.
    fn drain_events(&self) -> Vec<TtsEvent> {
        Vec::new()
    }
}
