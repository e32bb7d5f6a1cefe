//! The typed error taxonomy shared across the TTS subsystem.
//!
//! Modeled on the pack's `VoicePipelinePort` port-error style: one variant
//! per failure kind, `Display` via `#[error(...)]`, and a `recoverable()`
//! accessor the controller uses to pick a recovery policy instead of
//! matching on string content.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum TtsError {
    /// Binary missing, model not found, or external service down.
    #[error("synthesis engine unavailable: {0}")]
    EngineUnavailable(String),

    /// A per-call deadline expired before the engine produced audio.
    #[error("synthesis timed out after {0:?}")]
    SynthesisTimeout(std::time::Duration),

    /// The external CLI indicated no network connectivity.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The token bucket had no capacity and the caller declined to wait.
    #[error("rate limited")]
    RateLimited,

    /// The transcode subprocess failed or produced unparsable PCM.
    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    /// The audio output device failed to open or write.
    #[error("audio device error: {0}")]
    AudioDeviceError(String),

    /// The sentence parser should never fail; this is a defensive fallback.
    #[error("parse error: {0}")]
    ParseError(String),

    /// The cache layer failed to read or write; the cache is disabled, not the pipeline.
    #[error("cache I/O error: {0}")]
    CacheIOError(String),

    /// Caller requested a transition the controller's state machine forbids.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl TtsError {
    /// Whether the pipeline can continue after this error (skip/retry/fallback)
    /// or must surface it as fatal to the controller.
    pub fn recoverable(&self) -> bool {
        match self {
            TtsError::EngineUnavailable(_) => true,
            TtsError::SynthesisTimeout(_) => true,
            TtsError::NetworkUnavailable(_) => true,
            TtsError::RateLimited => true,
            TtsError::TranscodeFailed(_) => true,
            TtsError::AudioDeviceError(_) => false,
            TtsError::ParseError(_) => true,
            TtsError::CacheIOError(_) => true,
            TtsError::InvalidStateTransition { .. } => true,
        }
    }

    /// Short, stable kind tag for event-stream consumers (`Error{kind, ...}`).
    pub fn kind(&self) -> &'static str {
        match self {
            TtsError::EngineUnavailable(_) => "engine_unavailable",
            TtsError::SynthesisTimeout(_) => "synthesis_timeout",
            TtsError::NetworkUnavailable(_) => "network_unavailable",
            TtsError::RateLimited => "rate_limited",
            TtsError::TranscodeFailed(_) => "transcode_failed",
            TtsError::AudioDeviceError(_) => "audio_device_error",
            TtsError::ParseError(_) => "parse_error",
            TtsError::CacheIOError(_) => "cache_io_error",
            TtsError::InvalidStateTransition { .. } => "invalid_state_transition",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn audio_device_error_is_fatal() {
        assert!(!TtsError::AudioDeviceError("no device".into()).recoverable());
    }

    #[test]
    fn synthesis_timeout_is_recoverable() {
        assert!(TtsError::SynthesisTimeout(Duration::from_secs(5)).recoverable());
    }

    #[test]
    fn kind_tags_are_stable_strings() {
        assert_eq!(TtsError::RateLimited.kind(), "rate_limited");
        assert_eq!(
            TtsError::InvalidStateTransition {
                from: "Idle".into(),
                to: "Playing".into()
            }
            .kind(),
            "invalid_state_transition"
        );
    }
}
