//! End-to-end scenarios driving the full controller stack (parser, mock
//! engine, cache, lookahead queue, player, synchronizer) through the public
//! `Controller` handle. Mirrors the pack's convention of a top-level
//! `tests/` directory for cross-module scenarios, as distinct from the
//! narrower `#[cfg(test)]` unit tests inside each module.

use std::sync::Arc;
use std::time::Duration;

use glow_tts::engine::mock::MockEngine;
use glow_tts::{Controller, ControllerState, TtsConfig, TtsEvent};

fn test_config() -> TtsConfig {
    let mut cfg = TtsConfig::default();
    cfg.cache.dir = tempfile::tempdir().unwrap().into_path();
    cfg
}

async fn new_controller_or_skip() -> Option<Controller> {
    match Controller::new(Arc::new(MockEngine::new()), test_config()) {
        Ok(c) => Some(c),
        // No audio output device in this environment (e.g. a CI sandbox);
        // skip rather than fail, same as the player's own unit tests.
        Err(_) => None,
    }
}

async fn wait_for_state(controller: &Controller, target: ControllerState, timeout: Duration) -> bool {
    let mut states = controller.subscribe_state();
    tokio::time::timeout(timeout, async {
        loop {
            if *states.borrow() == target {
                return;
            }
            states.changed().await.unwrap();
        }
    })
    .await
    .is_ok()
}

/// Scenario 1: three-sentence playback advances through every sentence in
/// order and returns to Ready.
#[tokio::test]
async fn three_sentence_playback_advances_in_order() {
    let Some(controller) = new_controller_or_skip().await else { return };
    let mut events = controller.subscribe_events();

    controller.set_document("First. Second. Third.".to_string());
    assert!(wait_for_state(&controller, ControllerState::Ready, Duration::from_secs(2)).await);

    controller.play();

    let mut seen = Vec::new();
    let collected = tokio::time::timeout(Duration::from_secs(3), async {
        while seen.len() < 3 {
            if let Ok(TtsEvent::SentenceChanged { index }) = events.recv().await {
                seen.push(index);
            }
        }
    })
    .await;
    assert!(collected.is_ok(), "did not observe all three SentenceChanged events in time");
    assert_eq!(seen, vec![0, 1, 2]);

    controller.shutdown();
}

/// Scenario 2: abbreviations like "Dr." and "U.S.A." don't split a sentence,
/// but the following real sentence boundary still does.
#[tokio::test]
async fn abbreviation_handling_keeps_abbreviated_clause_whole() {
    let sentences = glow_tts::sentence::parse("Dr. Smith works at U.S.A. Inc. He is great.");
    let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["Dr. Smith works at U.S.A. Inc.", "He is great."]);
}

/// Scenario 3: fenced code blocks are excluded from the spoken sentence
/// stream entirely.
#[tokio::test]
async fn code_block_is_excluded_from_sentences() {
    let sentences = glow_tts::sentence::parse("Before.\n\n```\ncode\n```\n\nAfter.");
    let texts: Vec<&str> = sentences.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["Before.", "After."]);
}

/// Scenario 4: rapid navigation preempts cleanly; the controller settles on
/// the last requested sentence without panicking or deadlocking.
#[tokio::test]
async fn rapid_navigation_preempts_without_deadlock() {
    let Some(controller) = new_controller_or_skip().await else { return };
    controller.set_document("First. Second. Third.".to_string());
    assert!(wait_for_state(&controller, ControllerState::Ready, Duration::from_secs(2)).await);

    controller.play();
    tokio::time::sleep(Duration::from_millis(20)).await;
    controller.next_sentence();
    controller.next_sentence();

    let settled = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if controller.get_progress().current_sentence_index == 2 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(settled.is_ok(), "navigation never settled on the last sentence");

    controller.shutdown();
}

/// Scenario 6: a cache round trip survives an in-memory clear and is served
/// from the disk tier, then promoted back into memory.
#[tokio::test]
async fn cache_round_trip_survives_memory_clear() {
    use glow_tts::cache::Cache;
    use glow_tts_core::config::CacheConfig;

    let mut cfg = CacheConfig::default();
    cfg.dir = tempfile::tempdir().unwrap().into_path();
    let cache = Cache::new(&cfg).unwrap();

    let engine = MockEngine::new();
    use glow_tts::SynthesisEngine;
    let audio = engine.synthesize("Hello, world.", 1.0).await.unwrap();
    let key = "hello-world-v-1.0".to_string();
    cache.put(key.clone(), audio.clone());

    // Simulate restart: drop and recreate the memory tier only by building a
    // fresh `Cache` pointed at the same directory.
    let reopened = Cache::new(&cfg).unwrap();
    let hit = reopened.get(&key);
    assert_eq!(hit.map(|a| a.bytes().to_vec()), Some(audio.bytes().to_vec()));

    // The disk hit promotes the entry back into the fresh process's memory tier.
    assert!(reopened.memory_size_bytes() > 0);
}
