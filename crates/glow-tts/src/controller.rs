//! The top-level actor: owns the cache, engine, lookahead queue, player, and
//! synchronizer, and drives the controller state machine described in
//! `glow_tts_core::state`. Public methods are non-blocking — they send a
//! command into the actor's channel and return immediately; the actor itself
//! is the only thing that ever mutates playback state.

use std::sync::Arc;
use std::time::Duration;

use glow_tts_core::config::TtsConfig;
use glow_tts_core::error::TtsError;
use glow_tts_core::progress::Progress;
use glow_tts_core::sentence::{self, Sentence};
use glow_tts_core::state::{ControllerState, TtsEvent};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{error, warn};

use crate::cache::Cache;
use crate::engine::SynthesisEngine;
use crate::player::Player;
use crate::queue::LookaheadQueue;
use crate::synchronizer::Synchronizer;

const TAKE_DEADLINE: Duration = Duration::from_secs(15);
const AUTO_ADVANCE_POLL: Duration = Duration::from_millis(100);
const EVENT_CHANNEL_CAPACITY: usize = 256;

enum Cmd {
    SetDocument(String),
    Play,
    Pause,
    Resume,
    NextSentence,
    PrevSentence,
    SetSpeed(f64),
    Stop,
    Shutdown,
    /// Internal: sent by the auto-advance watcher when the current clip
    /// finishes playing naturally.
    ClipFinished { index: usize },
}

/// Cloneable handle to a running controller.
#[derive(Clone)]
pub struct Controller {
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    state_rx: watch::Receiver<ControllerState>,
    progress_rx: watch::Receiver<Progress>,
    event_tx: broadcast::Sender<TtsEvent>,
}

fn empty_progress() -> Progress {
    Progress {
        current_sentence_index: 0,
        total_sentences: 0,
        position_in_sentence: Duration::ZERO,
        current_sentence_duration: Duration::ZERO,
        sentences_processed: 0,
        sentences_cached: 0,
    }
}

impl Controller {
    pub fn new(engine: Arc<dyn SynthesisEngine>, config: TtsConfig) -> Result<Self, TtsError> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ControllerState::Idle);
        let (progress_tx, progress_rx) = watch::channel(empty_progress());
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let cache = Arc::new(Cache::new(&config.cache)?);
        cache.purge_expired_on_startup();
        cache.spawn_background_cleanup();

        let player = Arc::new(Player::new()?);
        let (sync_events_tx, sync_events_rx) = mpsc::unbounded_channel();
        let synchronizer = Arc::new(Synchronizer::new(Arc::clone(&player), sync_events_tx.clone()));

        // A small fixed worker pool (distinct from the lookahead window
        // depth below) does the actual synthesis; queue-originated events
        // (e.g. a fallback promotion warning) ride the same channel the
        // synchronizer already uses, so `forward_sync_events` picks them up
        // without a second relay task.
        const QUEUE_WORKER_COUNT: usize = 3;
        let queue = Arc::new(LookaheadQueue::with_worker_count(
            Arc::clone(&engine),
            "default".to_string(),
            config.piper.speed,
            QUEUE_WORKER_COUNT,
            config.lookahead.max(1),
            sync_events_tx,
        ));

        let actor = Actor {
            config,
            engine,
            cache,
            player,
            synchronizer,
            queue,
            sentences: Vec::new(),
            state: ControllerState::Idle,
            state_tx,
            event_tx: event_tx.clone(),
            cmd_tx: cmd_tx.clone(),
            current_index: 0,
        };

        tokio::spawn(forward_sync_events(sync_events_rx, event_tx.clone(), progress_tx));
        tokio::spawn(actor.run(cmd_rx));

        Ok(Self { cmd_tx, state_rx, progress_rx, event_tx })
    }

    pub fn set_document(&self, markdown: String) {
        let _ = self.cmd_tx.send(Cmd::SetDocument(markdown));
    }

    pub fn play(&self) {
        let _ = self.cmd_tx.send(Cmd::Play);
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(Cmd::Pause);
    }

    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Cmd::Resume);
    }

    pub fn next_sentence(&self) {
        let _ = self.cmd_tx.send(Cmd::NextSentence);
    }

    pub fn prev_sentence(&self) {
        let _ = self.cmd_tx.send(Cmd::PrevSentence);
    }

    pub fn set_speed(&self, speed: f64) {
        let _ = self.cmd_tx.send(Cmd::SetSpeed(speed));
    }

    pub fn stop(&self) {
        let _ = self.cmd_tx.send(Cmd::Stop);
    }

    pub fn shutdown(&self) {
        let _ = self.cmd_tx.send(Cmd::Shutdown);
    }

    pub fn get_state(&self) -> ControllerState {
        *self.state_rx.borrow()
    }

    pub fn get_progress(&self) -> Progress {
        *self.progress_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TtsEvent> {
        self.event_tx.subscribe()
    }
}

async fn forward_sync_events(
    mut rx: mpsc::UnboundedReceiver<TtsEvent>,
    tx: broadcast::Sender<TtsEvent>,
    progress_tx: watch::Sender<Progress>,
) {
    while let Some(event) = rx.recv().await {
        if let TtsEvent::ProgressTick { progress } = &event {
            let _ = progress_tx.send(*progress);
        }
        let _ = tx.send(event);
    }
}

struct Actor {
    config: TtsConfig,
    engine: Arc<dyn SynthesisEngine>,
    cache: Arc<Cache>,
    player: Arc<Player>,
    synchronizer: Arc<Synchronizer>,
    queue: Arc<LookaheadQueue>,
    sentences: Vec<Sentence>,
    state: ControllerState,
    state_tx: watch::Sender<ControllerState>,
    event_tx: broadcast::Sender<TtsEvent>,
    cmd_tx: mpsc::UnboundedSender<Cmd>,
    current_index: usize,
}

impl Actor {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<Cmd>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Cmd::SetDocument(markdown) => self.handle_set_document(markdown).await,
                Cmd::Play => self.handle_play().await,
                Cmd::Pause => self.handle_pause().await,
                Cmd::Resume => self.handle_resume().await,
                Cmd::NextSentence => self.handle_seek(self.current_index + 1).await,
                Cmd::PrevSentence => self.handle_seek(self.current_index.saturating_sub(1)).await,
                Cmd::SetSpeed(speed) => self.handle_set_speed(speed).await,
                Cmd::Stop => self.handle_stop().await,
                Cmd::ClipFinished { index } => self.handle_clip_finished(index).await,
                Cmd::Shutdown => {
                    self.handle_stop().await;
                    self.queue.shutdown();
                    self.synchronizer.shutdown();
                    break;
                }
            }
        }
    }

    fn transition(&mut self, to: ControllerState) -> bool {
        if !self.state.can_transition_to(to) {
            warn!(from = self.state.name(), to = to.name(), "rejected invalid state transition");
            let _ = self.event_tx.send(TtsEvent::from_error(&TtsError::InvalidStateTransition {
                from: self.state.name().to_string(),
                to: to.name().to_string(),
            }));
            return false;
        }
        self.state = to;
        let _ = self.state_tx.send(to);
        let _ = self.event_tx.send(TtsEvent::StateChanged { state: to });
        true
    }

    fn emit_error(&self, err: TtsError) {
        error!(error = %err, "controller error");
        let _ = self.event_tx.send(TtsEvent::from_error(&err));
    }

    fn emit_warning(&self, kind: &'static str, message: String) {
        warn!(kind, %message, "controller recovered from an error");
        let _ = self.event_tx.send(TtsEvent::Warning { kind, message });
    }

    async fn handle_set_document(&mut self, markdown: String) {
        // Initializing is only reachable from Idle; loading a new document
        // on top of an existing session first winds back down through
        // Stopping, same as an explicit `stop()`.
        if self.state != ControllerState::Idle {
            self.handle_stop().await;
        }
        if !self.transition(ControllerState::Initializing) {
            return;
        }

        if let Err(e) = self.engine.validate().await {
            self.emit_error(e);
            self.transition(ControllerState::Error);
            return;
        }

        self.sentences = sentence::parse_with_options(&markdown, sentence::DEFAULT_MIN_LENGTH, glow_tts_core::duration::DEFAULT_WPM);
        self.current_index = 0;
        self.queue.load(self.sentences.clone()).await;
        self.synchronizer.load(self.sentences.iter().map(|s| s.estimated_duration).collect()).await;

        self.transition(ControllerState::Ready);
    }

    async fn handle_play(&mut self) {
        if self.sentences.is_empty() {
            self.emit_error(TtsError::ParseError("no document loaded".into()));
            return;
        }
        if !self.enter_processing() {
            return;
        }
        self.play_index(self.current_index).await;
    }

    async fn play_index(&mut self, index: usize) {
        let Some(sentence) = self.sentences.get(index).cloned() else {
            self.transition(ControllerState::Ready);
            return;
        };

        self.queue.advance_to(index).await;
        let cache_key = sentence.cache_key("default", self.config.piper.speed);
        let audio = if let Some(cached) = self.cache.get(&cache_key) {
            Ok(cached)
        } else {
            match self.queue.take(index, TAKE_DEADLINE).await {
                Some(Ok(audio)) => {
                    self.cache.put(cache_key, audio.clone());
                    Ok(audio)
                }
                Some(Err(err)) => Err(err),
                None => Err(TtsError::SynthesisTimeout(TAKE_DEADLINE)),
            }
        };

        match audio {
            Ok(audio) => {
                self.synchronizer.set_measured_duration(index, audio.duration()).await;
                if let Err(e) = self.player.play(audio) {
                    self.emit_error(e);
                    self.transition(ControllerState::Error);
                    return;
                }
                self.current_index = index;
                self.synchronizer.start_sentence(index).await;
                let _ = self.event_tx.send(TtsEvent::SentenceChanged { index });
                // Synthesis is done; drop back to Ready before entering Playing,
                // since the state table has no direct Processing -> Playing edge.
                self.transition(ControllerState::Ready);
                self.transition(ControllerState::Playing);
                spawn_auto_advance_watcher(Arc::clone(&self.player), index, self.cmd_tx.clone());
            }
            Err(err) => {
                let recoverable = err.recoverable();
                if recoverable && index + 1 < self.sentences.len() {
                    // Skip the failed sentence rather than stalling the whole document;
                    // this is a recovery, not a fatal error, so it surfaces as a Warning.
                    self.emit_warning("sentence_skipped", format!("sentence {index} failed and was skipped: {err}"));
                    self.current_index = index + 1;
                    Box::pin(self.play_index(self.current_index)).await;
                } else {
                    self.emit_error(err);
                    self.transition(ControllerState::Error);
                }
            }
        }
    }

    async fn handle_pause(&mut self) {
        if !self.transition(ControllerState::Paused) {
            return;
        }
        if let Err(e) = self.player.pause() {
            self.emit_error(e);
        }
        self.synchronizer.pause().await;
    }

    async fn handle_resume(&mut self) {
        if !self.transition(ControllerState::Playing) {
            return;
        }
        if let Err(e) = self.player.resume() {
            self.emit_error(e);
        }
        self.synchronizer.resume().await;
        spawn_auto_advance_watcher(Arc::clone(&self.player), self.current_index, self.cmd_tx.clone());
    }

    async fn handle_seek(&mut self, index: usize) {
        if index >= self.sentences.len() {
            return;
        }
        let was_playing = matches!(self.state, ControllerState::Playing | ControllerState::Processing);
        self.current_index = index;
        if was_playing {
            if self.enter_processing() {
                self.play_index(index).await;
            }
        } else {
            self.synchronizer.start_sentence(index).await;
            let _ = self.event_tx.send(TtsEvent::SentenceChanged { index });
        }
    }

    /// Only `Ready -> Processing` is a legal edge; from `Playing` this first
    /// drops back through `Ready`, mirroring the state table's shape.
    fn enter_processing(&mut self) -> bool {
        match self.state {
            ControllerState::Processing => true,
            ControllerState::Playing => self.transition(ControllerState::Ready) && self.transition(ControllerState::Processing),
            _ => self.transition(ControllerState::Processing),
        }
    }

    async fn handle_set_speed(&mut self, speed: f64) {
        self.config.piper.speed = speed;
        self.queue.set_speed(speed);
        self.synchronizer.set_speed(speed).await;
    }

    async fn handle_stop(&mut self) {
        self.transition(ControllerState::Stopping);
        if let Err(e) = self.player.stop() {
            self.emit_error(e);
        }
        self.synchronizer.stop().await;
        self.current_index = 0;
        self.transition(ControllerState::Idle);
    }

    async fn handle_clip_finished(&mut self, index: usize) {
        if index != self.current_index || !matches!(self.state, ControllerState::Playing) {
            // Stale watcher from a sentence we've already moved past.
            return;
        }
        if index + 1 < self.sentences.len() {
            if self.enter_processing() {
                self.play_index(index + 1).await;
            }
        } else {
            self.handle_stop().await;
        }
    }
}

/// Polls the player until the current clip finishes, then reports back
/// through the command channel so the transition is serialized with every
/// other command instead of racing the actor directly.
fn spawn_auto_advance_watcher(player: Arc<Player>, index: usize, cmd_tx: mpsc::UnboundedSender<Cmd>) {
    tokio::spawn(async move {
        // Give the player a moment to start before polling for "finished".
        tokio::time::sleep(AUTO_ADVANCE_POLL).await;
        loop {
            if !player.is_playing() {
                let _ = cmd_tx.send(Cmd::ClipFinished { index });
                return;
            }
            tokio::time::sleep(AUTO_ADVANCE_POLL).await;
        }
    });
}
