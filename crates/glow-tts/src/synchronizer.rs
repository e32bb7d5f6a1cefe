//! Audio/visual synchronizer: a 20Hz tick task that tracks progress within
//! the sentence currently being voiced and publishes `ProgressTick` events
//! for the reader UI to follow along with. Sentence advancement itself
//! (`SentenceChanged`) is owned entirely by the controller, which drives
//! `start_sentence` from real clip-completion events; this loop never
//! advances the index on its own.
//!
//! The player only reports position within the *current* clip, so this
//! keeps its own predicted clock (wall-clock elapsed since the clip started,
//! scaled by speed) and compares it against the player's real position using
//! [`glow_tts_core::drift::DriftTracker`]. Corrections adjust the predicted
//! clock's offset only — the player itself is never seeked, matching the
//! tracker's own contract.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glow_tts_core::drift::{DriftDecision, DriftTracker};
use glow_tts_core::progress::Progress;
use glow_tts_core::state::TtsEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::player::Player;

const TICK_INTERVAL: Duration = Duration::from_millis(50);

struct State {
    sentence_durations: Vec<Duration>,
    current_index: usize,
    predicted_start: Instant,
    correction_offset_ms: i64,
    last_correction: Instant,
    drift: DriftTracker,
    speed: f64,
    sentences_cached: usize,
    running: bool,
}

pub struct Synchronizer {
    player: Arc<Player>,
    state: Arc<Mutex<State>>,
    task: tokio::task::JoinHandle<()>,
}

impl Synchronizer {
    pub fn new(player: Arc<Player>, event_tx: mpsc::UnboundedSender<TtsEvent>) -> Self {
        let state = Arc::new(Mutex::new(State {
            sentence_durations: Vec::new(),
            current_index: 0,
            predicted_start: Instant::now(),
            correction_offset_ms: 0,
            last_correction: Instant::now(),
            drift: DriftTracker::default(),
            speed: 1.0,
            sentences_cached: 0,
            running: false,
        }));

        let task_state = Arc::clone(&state);
        let task_player = Arc::clone(&player);
        let task = tokio::spawn(async move { tick_loop(task_player, task_state, event_tx).await });

        Self { player, state, task }
    }

    /// Loads the durations for a freshly-parsed document and resets tracking
    /// to sentence 0. Call before the first `play()`.
    pub async fn load(&self, sentence_durations: Vec<Duration>) {
        let mut state = self.state.lock().await;
        state.sentence_durations = sentence_durations;
        state.current_index = 0;
        state.correction_offset_ms = 0;
        state.drift = DriftTracker::default();
        state.predicted_start = Instant::now();
        state.last_correction = Instant::now();
        state.running = false;
    }

    /// Replaces the measured duration for a sentence once real audio exists,
    /// in place of the a-priori word-count estimate used before synthesis.
    pub async fn set_measured_duration(&self, index: usize, duration: Duration) {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.sentence_durations.get_mut(index) {
            *slot = duration;
        }
    }

    pub async fn start_sentence(&self, index: usize) {
        let mut state = self.state.lock().await;
        state.current_index = index;
        state.predicted_start = Instant::now();
        state.correction_offset_ms = 0;
        state.running = true;
    }

    pub async fn pause(&self) {
        self.state.lock().await.running = false;
    }

    pub async fn resume(&self) {
        let mut state = self.state.lock().await;
        // Resume the predicted clock from wherever the player actually is,
        // rather than letting wall-clock time accrue while paused.
        state.predicted_start = Instant::now() - self.player.position();
        state.running = true;
    }

    pub async fn stop(&self) {
        self.state.lock().await.running = false;
    }

    pub async fn set_speed(&self, speed: f64) {
        self.state.lock().await.speed = speed.max(0.01);
    }

    pub async fn set_sentences_cached(&self, count: usize) {
        self.state.lock().await.sentences_cached = count;
    }

    pub async fn progress(&self) -> Progress {
        let state = self.state.lock().await;
        let current_duration = state.sentence_durations.get(state.current_index).copied().unwrap_or(Duration::ZERO);
        Progress {
            current_sentence_index: state.current_index,
            total_sentences: state.sentence_durations.len(),
            position_in_sentence: self.player.position(),
            current_sentence_duration: current_duration,
            sentences_processed: state.current_index,
            sentences_cached: state.sentences_cached,
        }
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn tick_loop(player: Arc<Player>, state: Arc<Mutex<State>>, event_tx: mpsc::UnboundedSender<TtsEvent>) {
    let mut interval = tokio::time::interval(TICK_INTERVAL);
    loop {
        interval.tick().await;

        let mut state = state.lock().await;
        if !state.running || state.sentence_durations.is_empty() {
            continue;
        }

        let speed = state.speed;
        let predicted_ms = (state.predicted_start.elapsed().as_secs_f64() * speed * 1000.0) as i64;
        let player_ms = player.position().as_millis() as i64;
        let raw_drift_ms = player_ms - predicted_ms;

        let since_correction = state.last_correction.elapsed();
        let decision = state.drift.record(raw_drift_ms, since_correction);
        if let DriftDecision::Correct { offset_ms } = decision {
            debug!(offset_ms, "synchronizer applying drift correction");
            state.correction_offset_ms += offset_ms;
            state.last_correction = Instant::now();
        }

        // The controller is the sole authority on sentence advancement
        // (driven by real `ClipFinished` events and explicit seeks); this
        // loop only tracks drift/progress within the current sentence, it
        // never advances `current_index` or emits `SentenceChanged` itself.
        let progress = Progress {
            current_sentence_index: state.current_index,
            total_sentences: state.sentence_durations.len(),
            position_in_sentence: player.position(),
            current_sentence_duration: state
                .sentence_durations
                .get(state.current_index)
                .copied()
                .unwrap_or(Duration::ZERO),
            sentences_processed: state.current_index,
            sentences_cached: state.sentences_cached,
        };
        let _ = event_tx.send(TtsEvent::ProgressTick { progress });
    }
}
