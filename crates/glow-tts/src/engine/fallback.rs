//! Wraps a primary and secondary engine. Counts consecutive primary
//! failures and promotes the secondary once a threshold is crossed; a
//! promotion only takes effect at the next `synthesize` call boundary,
//! never mid-sentence.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use glow_tts_core::audio::Audio;
use glow_tts_core::error::TtsError;
use glow_tts_core::state::TtsEvent;
use tracing::warn;

use super::{EngineInfo, SynthesisEngine};

const DEFAULT_THRESHOLD: u32 = 3;

pub struct FallbackEngine {
    primary: Arc<dyn SynthesisEngine>,
    secondary: Arc<dyn SynthesisEngine>,
    threshold: u32,
    consecutive_failures: AtomicU32,
    promoted: AtomicBool,
    pending_events: Mutex<Vec<TtsEvent>>,
}

impl FallbackEngine {
    pub fn new(primary: Arc<dyn SynthesisEngine>, secondary: Arc<dyn SynthesisEngine>) -> Self {
        Self::with_threshold(primary, secondary, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(primary: Arc<dyn SynthesisEngine>, secondary: Arc<dyn SynthesisEngine>, threshold: u32) -> Self {
        Self {
            primary,
            secondary,
            threshold,
            consecutive_failures: AtomicU32::new(0),
            promoted: AtomicBool::new(false),
            pending_events: Mutex::new(Vec::new()),
        }
    }

    /// Whether the secondary has been promoted as of the last completed call.
    pub fn is_promoted(&self) -> bool {
        self.promoted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SynthesisEngine for FallbackEngine {
    async fn synthesize(&self, text: &str, speed: f64) -> Result<Audio, TtsError> {
        if self.promoted.load(Ordering::SeqCst) {
            return self.secondary.synthesize(text, speed).await;
        }

        match self.primary.synthesize(text, speed).await {
            Ok(audio) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(audio)
            }
            Err(primary_err) => {
                // The call that crosses the threshold still reports the primary's
                // failure; promotion takes effect starting with the next call.
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.threshold {
                    warn!(
                        failures,
                        threshold = self.threshold,
                        "primary synthesis engine promoted secondary after repeated failures"
                    );
                    self.promoted.store(true, Ordering::SeqCst);
                    self.pending_events.lock().unwrap().push(TtsEvent::Warning {
                        kind: "fallback_promoted",
                        message: format!("primary engine failed {failures} consecutive times; switched to secondary"),
                    });
                }
                Err(primary_err)
            }
        }
    }

    fn info(&self) -> EngineInfo {
        if self.promoted.load(Ordering::SeqCst) {
            self.secondary.info()
        } else {
            self.primary.info()
        }
    }

    async fn validate(&self) -> Result<(), TtsError> {
        // Healthy if either underlying engine is healthy.
        match self.primary.validate().await {
            Ok(()) => Ok(()),
            Err(primary_err) => self.secondary.validate().await.map_err(|_| primary_err),
        }
    }

    fn drain_events(&self) -> Vec<TtsEvent> {
        std::mem::take(&mut self.pending_events.lock().unwrap())
    }
}
