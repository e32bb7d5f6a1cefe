//! Word-count based duration estimation, used before real audio exists.

use std::time::Duration;

/// Average speaking rate assumed absent any measured sample.
pub const DEFAULT_WPM: f64 = 150.0;

/// Estimates how long `text` will take to speak at `wpm` words per minute.
///
/// This is a rough a-priori estimate used for prefetch scheduling and
/// progress projection before the real synthesized clip is available; once
/// audio exists, its measured [`crate::audio::Audio::duration`] is authoritative.
pub fn estimate_duration(text: &str, wpm: f64) -> Duration {
    if wpm <= 0.0 {
        return Duration::ZERO;
    }
    let words = text.split_whitespace().count().max(1) as f64;
    let minutes = words / wpm;
    Duration::from_secs_f64((minutes * 60.0).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimates_proportionally_to_word_count() {
        let short = estimate_duration("one two three", DEFAULT_WPM);
        let long = estimate_duration("one two three four five six", DEFAULT_WPM);
        assert!(long > short);
    }

    #[test]
    fn empty_text_still_yields_a_positive_floor() {
        let d = estimate_duration("", DEFAULT_WPM);
        assert!(d > Duration::ZERO);
    }

    #[test]
    fn zero_wpm_yields_zero() {
        assert_eq!(estimate_duration("hello", 0.0), Duration::ZERO);
    }
}
