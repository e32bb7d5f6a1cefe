//! glow-tts — synthesis engines, a two-tier cache, a lookahead queue, a
//! rodio-backed player, an audio/visual synchronizer, and the controller
//! actor that ties them together behind the state machine in
//! `glow_tts_core::state`.
//!
//! This crate is a library: it has no CLI, no config-file loader, and no
//! markdown renderer. A host application owns those and hands this crate
//! already-parsed [`glow_tts_core::config::TtsConfig`] plus a chosen
//! [`engine::SynthesisEngine`].

pub mod cache;
pub mod cancellation;
pub mod controller;
pub mod engine;
pub mod player;
pub mod queue;
pub mod synchronizer;
pub mod token_bucket;

pub use controller::Controller;
pub use engine::{EngineInfo, SynthesisEngine};

pub use glow_tts_core::audio::{Audio, AudioFormat, SampleFormat};
pub use glow_tts_core::config::{CacheConfig, EngineChoice, GttsConfig, PiperConfig, TtsConfig};
pub use glow_tts_core::error::TtsError;
pub use glow_tts_core::progress::Progress;
pub use glow_tts_core::sentence::{self, Sentence};
pub use glow_tts_core::state::{ControllerState, TtsEvent};
