//! L1 in-memory cache: LRU by recency, bounded by total bytes rather than
//! entry count, since audio buffers vary wildly in size. `get` is O(1) plus
//! a recency bump; `put` may evict several entries to fit the new one.

use std::sync::Mutex;

use glow_tts_core::audio::Audio;
use lru::LruCache;

const DEFAULT_CAPACITY_BYTES: u64 = 100 * 1024 * 1024;

pub struct MemoryCache {
    inner: Mutex<Inner>,
    capacity_bytes: u64,
}

struct Inner {
    entries: LruCache<String, Audio>,
    size_bytes: u64,
}

impl MemoryCache {
    pub fn new(capacity_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                // Unbounded by count; eviction is driven by `size_bytes` instead.
                entries: LruCache::unbounded(),
                size_bytes: 0,
            }),
            capacity_bytes,
        }
    }

    /// Returns a clone of the cached `Arc`-backed audio, if present, and
    /// marks the entry as most-recently-used. Callers must not mutate the
    /// returned audio; `Audio` has no mutation API, so this is enforced by
    /// the type itself.
    pub fn get(&self, key: &str) -> Option<Audio> {
        let mut inner = self.inner.lock().expect("memory cache mutex poisoned");
        inner.entries.get(key).cloned()
    }

    pub fn put(&self, key: String, audio: Audio) {
        let len = audio.len() as u64;
        if len > self.capacity_bytes {
            // Larger than the whole tier; not cacheable in memory.
            return;
        }

        let mut inner = self.inner.lock().expect("memory cache mutex poisoned");
        if let Some(old) = inner.entries.put(key, audio) {
            inner.size_bytes = inner.size_bytes.saturating_sub(old.len() as u64);
        }
        inner.size_bytes += len;

        while inner.size_bytes > self.capacity_bytes {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.size_bytes = inner.size_bytes.saturating_sub(evicted.len() as u64);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<Audio> {
        let mut inner = self.inner.lock().expect("memory cache mutex poisoned");
        let removed = inner.entries.pop(key);
        if let Some(audio) = &removed {
            inner.size_bytes = inner.size_bytes.saturating_sub(audio.len() as u64);
        }
        removed
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("memory cache mutex poisoned");
        inner.entries.clear();
        inner.size_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("memory cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().expect("memory cache mutex poisoned").size_bytes
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_tts_core::audio::{AudioFormat, SampleFormat};

    fn audio_of(len: usize) -> Audio {
        Audio::new(
            vec![0u8; len],
            AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        )
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = MemoryCache::new(1024);
        cache.put("a".to_string(), audio_of(10));
        assert_eq!(cache.get("a").unwrap().len(), 10);
    }

    #[test]
    fn miss_returns_none() {
        let cache = MemoryCache::new(1024);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn evicts_least_recently_used_to_fit_budget() {
        let cache = MemoryCache::new(100);
        cache.put("a".to_string(), audio_of(60));
        cache.put("b".to_string(), audio_of(60));
        // "a" was least recently used and must have been evicted to fit "b".
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn get_bumps_recency_so_it_survives_eviction() {
        let cache = MemoryCache::new(100);
        cache.put("a".to_string(), audio_of(50));
        cache.put("b".to_string(), audio_of(40));
        assert!(cache.get("a").is_some()); // bump "a" to most-recent
        cache.put("c".to_string(), audio_of(40));
        // "b" should be evicted instead of "a", since "a" was touched more recently.
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn oversized_entry_is_not_cached() {
        let cache = MemoryCache::new(100);
        cache.put("huge".to_string(), audio_of(1000));
        assert!(cache.get("huge").is_none());
        assert_eq!(cache.size_bytes(), 0);
    }

    #[test]
    fn remove_frees_its_bytes() {
        let cache = MemoryCache::new(1024);
        cache.put("a".to_string(), audio_of(10));
        assert_eq!(cache.size_bytes(), 10);
        cache.remove("a");
        assert_eq!(cache.size_bytes(), 0);
    }
}
