//! Two-tier read-through cache: memory (L1) in front of disk (L2). A miss on
//! both tiers is a cache miss for the caller; a disk hit is promoted into
//! memory so the next lookup for the same key is O(1). Puts are written to
//! both tiers; concurrent puts for the same key are last-writer-wins on
//! each tier independently, which is fine since entries are content-addressed
//! and therefore idempotent in practice.

pub mod disk;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use glow_tts_core::audio::Audio;
use glow_tts_core::config::CacheConfig;
use glow_tts_core::error::TtsError;
use tracing::{error, warn};

pub use disk::DiskCache;
pub use memory::MemoryCache;

pub struct Cache {
    memory: MemoryCache,
    disk: DiskCache,
}

impl Cache {
    pub fn new(config: &CacheConfig) -> Result<Self, TtsError> {
        Ok(Self {
            memory: MemoryCache::new(config.max_size_bytes),
            disk: DiskCache::new(config.dir.clone(), config.disk_capacity_bytes())?,
        })
    }

    pub fn get(&self, key: &str) -> Option<Audio> {
        if let Some(audio) = self.memory.get(key) {
            return Some(audio);
        }
        let audio = self.disk.get(key)?;
        self.memory.put(key.to_string(), audio.clone());
        Some(audio)
    }

    pub fn put(&self, key: String, audio: Audio) {
        self.memory.put(key.clone(), audio.clone());
        if let Err(e) = self.disk.put(&key, &audio) {
            warn!(error = %e, key, "failed to persist cache entry to disk tier");
        }
    }

    pub fn remove(&self, key: &str) {
        self.memory.remove(key);
        self.disk.remove(key);
    }

    pub fn memory_size_bytes(&self) -> u64 {
        self.memory.size_bytes()
    }

    /// Removes expired disk entries once at startup, synchronously, so a
    /// freshly-constructed cache never serves a stale entry before the
    /// background task has had a chance to run.
    pub fn purge_expired_on_startup(&self) {
        match self.disk.purge_expired() {
            Ok(removed) if removed > 0 => warn!(removed, "purged expired cache entries at startup"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to purge expired cache entries at startup"),
        }
    }

    /// Spawns the hourly background sweep that evicts over-budget and
    /// TTL-expired disk entries. Returns a handle the caller can abort on
    /// shutdown; dropping the handle without aborting lets the task keep
    /// running detached, which is harmless since it only touches the cache
    /// directory.
    pub fn spawn_background_cleanup(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(DiskCache::cleanup_interval());
            loop {
                interval.tick().await;
                if let Err(e) = cache.disk.purge_expired() {
                    error!(error = %e, "background cache cleanup: purge_expired failed");
                }
                if let Err(e) = cache.disk.evict_to_fit() {
                    error!(error = %e, "background cache cleanup: evict_to_fit failed");
                }
            }
        })
    }

    /// Optional aggressive flush on shutdown: re-runs eviction immediately
    /// rather than waiting for the next scheduled sweep.
    pub fn flush_on_shutdown(&self) {
        if let Err(e) = self.disk.evict_to_fit() {
            warn!(error = %e, "shutdown cache flush failed");
        }
    }
}

pub fn default_cache_dir_for_tests() -> PathBuf {
    std::env::temp_dir().join("glow-tts-cache-test")
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_tts_core::audio::{AudioFormat, SampleFormat};

    fn test_config() -> CacheConfig {
        CacheConfig {
            dir: tempfile::tempdir().unwrap().into_path(),
            max_size_bytes: 1024 * 1024,
        }
    }

    fn audio_of(len: usize) -> Audio {
        Audio::new(
            vec![7u8; len],
            AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        )
    }

    #[test]
    fn put_is_visible_from_memory_immediately() {
        let cache = Cache::new(&test_config()).unwrap();
        cache.put("k".to_string(), audio_of(16));
        assert_eq!(cache.memory_size_bytes(), 16);
        assert!(cache.get("k").is_some());
    }

    #[test]
    fn disk_hit_promotes_into_memory() {
        let config = test_config();
        let cache = Cache::new(&config).unwrap();
        cache.put("k".to_string(), audio_of(32));
        cache.memory.clear();
        assert_eq!(cache.memory_size_bytes(), 0);

        let got = cache.get("k");
        assert!(got.is_some());
        assert_eq!(cache.memory_size_bytes(), 32);
    }

    #[test]
    fn miss_on_both_tiers_is_none() {
        let cache = Cache::new(&test_config()).unwrap();
        assert!(cache.get("nope").is_none());
    }

    #[test]
    fn remove_clears_both_tiers() {
        let cache = Cache::new(&test_config()).unwrap();
        cache.put("k".to_string(), audio_of(16));
        cache.remove("k");
        assert!(cache.get("k").is_none());
    }
}
