//! Pure data types shared by the lookahead queue: priority, entry status, and the entry itself.
//!
//! The queue's scheduling logic lives in `glow-tts`; this module only defines
//! the vocabulary so it can be reused by the controller and synchronizer
//! without pulling in tokio.

use std::time::Instant;

use crate::audio::Audio;
use crate::error::TtsError;
use crate::sentence::Sentence;

/// Work priority for a queue entry. Workers always pull the highest priority
/// pending entry first; ties broken by ascending sentence index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Immediate,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Lifecycle status of a single queue entry.
#[derive(Debug, Clone)]
pub enum EntryStatus {
    /// Enqueued, not yet picked up by a worker.
    Pending,
    /// A worker is actively synthesizing this entry.
    InFlight,
    /// Audio is synthesized and available for playback.
    Ready,
    /// Synthesis failed; the error is preserved for diagnostics/fallback decisions.
    Failed(TtsError),
    /// Evicted before completion (cursor moved past it, or queue pressure).
    Discarded,
}

impl EntryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EntryStatus::Ready | EntryStatus::Failed(_) | EntryStatus::Discarded)
    }
}

/// A sentence paired with its synthesis state within the lookahead queue.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub sentence: Sentence,
    pub audio: Option<Audio>,
    pub status: EntryStatus,
    pub priority: Priority,
    pub created_at: Instant,
}

impl QueueEntry {
    pub fn pending(sentence: Sentence, priority: Priority) -> Self {
        Self {
            sentence,
            audio: None,
            status: EntryStatus::Pending,
            priority,
            created_at: Instant::now(),
        }
    }

    pub fn byte_len(&self) -> usize {
        self.audio.as_ref().map(Audio::len).unwrap_or(0)
    }
}
