//! The `Progress` read-model: always computed from current state, never stored.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub current_sentence_index: usize,
    pub total_sentences: usize,
    pub position_in_sentence: Duration,
    pub current_sentence_duration: Duration,
    pub sentences_processed: usize,
    pub sentences_cached: usize,
}

impl Progress {
    pub fn fraction_complete(&self) -> f64 {
        if self.total_sentences == 0 {
            return 0.0;
        }
        self.current_sentence_index as f64 / self.total_sentences as f64
    }

    pub fn is_done(&self) -> bool {
        self.total_sentences > 0 && self.current_sentence_index >= self.total_sentences
    }
}
