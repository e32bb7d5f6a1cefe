//! L2 persistent cache: survives process restarts. Each entry is a pair of
//! files under the cache directory — `<key>.pcm` (raw audio bytes) and
//! `<key>.json` (format + bookkeeping) — written with restrictive
//! permissions since the directory can hold arbitrary amounts of synthesized
//! speech. Eviction scores age, size, and access frequency together rather
//! than pure LRU, since a large rarely-replayed clip should go before a
//! small one that's replayed constantly.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use glow_tts_core::audio::{Audio, AudioFormat, SampleFormat};
use glow_tts_core::error::TtsError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const DEFAULT_CAPACITY_BYTES: u64 = 1024 * 1024 * 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sidecar {
    sample_rate: u32,
    channels: u16,
    sample_format: StoredSampleFormat,
    created_unix_secs: u64,
    last_access_unix_secs: u64,
    access_count: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum StoredSampleFormat {
    Signed16Le,
    Float32,
}

impl From<SampleFormat> for StoredSampleFormat {
    fn from(f: SampleFormat) -> Self {
        match f {
            SampleFormat::Signed16Le => StoredSampleFormat::Signed16Le,
            SampleFormat::Float32 => StoredSampleFormat::Float32,
        }
    }
}

impl From<StoredSampleFormat> for SampleFormat {
    fn from(f: StoredSampleFormat) -> Self {
        match f {
            StoredSampleFormat::Signed16Le => SampleFormat::Signed16Le,
            StoredSampleFormat::Float32 => SampleFormat::Float32,
        }
    }
}

pub struct DiskCache {
    dir: PathBuf,
    capacity_bytes: u64,
    ttl: Duration,
}

impl DiskCache {
    pub fn new(dir: PathBuf, capacity_bytes: u64) -> Result<Self, TtsError> {
        Self::with_ttl(dir, capacity_bytes, DEFAULT_TTL)
    }

    pub fn with_ttl(dir: PathBuf, capacity_bytes: u64, ttl: Duration) -> Result<Self, TtsError> {
        std::fs::create_dir_all(&dir).map_err(|e| TtsError::CacheIOError(e.to_string()))?;
        set_dir_permissions(&dir)?;
        Ok(Self { dir, capacity_bytes, ttl })
    }

    fn pcm_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.pcm"))
    }

    fn sidecar_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn get(&self, key: &str) -> Option<Audio> {
        let sidecar_path = self.sidecar_path(key);
        let pcm_path = self.pcm_path(key);

        let mut sidecar: Sidecar = std::fs::read(&sidecar_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())?;

        if entry_age(&sidecar) > self.ttl {
            let _ = std::fs::remove_file(&sidecar_path);
            let _ = std::fs::remove_file(&pcm_path);
            return None;
        }

        let bytes = std::fs::read(&pcm_path).ok()?;
        sidecar.last_access_unix_secs = now_unix_secs();
        sidecar.access_count += 1;
        let _ = write_sidecar(&sidecar_path, &sidecar);

        Some(Audio::new(
            bytes,
            AudioFormat {
                sample_rate: sidecar.sample_rate,
                channels: sidecar.channels,
                sample_format: sidecar.sample_format.into(),
            },
        ))
    }

    pub fn put(&self, key: &str, audio: &Audio) -> Result<(), TtsError> {
        let now = now_unix_secs();
        let sidecar = Sidecar {
            sample_rate: audio.format().sample_rate,
            channels: audio.format().channels,
            sample_format: audio.format().sample_format.into(),
            created_unix_secs: now,
            last_access_unix_secs: now,
            access_count: 0,
        };

        let pcm_path = self.pcm_path(key);
        std::fs::write(&pcm_path, audio.bytes().as_ref()).map_err(|e| TtsError::CacheIOError(e.to_string()))?;
        set_file_permissions(&pcm_path)?;
        write_sidecar(&self.sidecar_path(key), &sidecar)?;
        set_file_permissions(&self.sidecar_path(key))?;

        self.evict_to_fit()?;
        Ok(())
    }

    pub fn remove(&self, key: &str) {
        let _ = std::fs::remove_file(self.pcm_path(key));
        let _ = std::fs::remove_file(self.sidecar_path(key));
    }

    /// Scans the directory, removes expired entries, and evicts the
    /// lowest-scored survivors until the tier is back under budget. Score
    /// combines age, size, and access frequency: a big, old, rarely-played
    /// clip is evicted well before a small, frequently-replayed one.
    pub fn evict_to_fit(&self) -> Result<(), TtsError> {
        let mut entries = self.scan()?;
        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        if total <= self.capacity_bytes {
            return Ok(());
        }

        entries.sort_by(|a, b| score(a).partial_cmp(&score(b)).unwrap_or(std::cmp::Ordering::Equal));

        for entry in entries {
            if total <= self.capacity_bytes {
                break;
            }
            self.remove(&entry.key);
            total = total.saturating_sub(entry.size_bytes);
        }
        Ok(())
    }

    /// Removes any entry past its TTL, independent of the size budget.
    /// Intended to run once at startup and then on `CLEANUP_INTERVAL`.
    pub fn purge_expired(&self) -> Result<usize, TtsError> {
        let mut removed = 0;
        for entry in self.scan()? {
            if entry_age(&entry.sidecar) > self.ttl {
                self.remove(&entry.key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn cleanup_interval() -> Duration {
        CLEANUP_INTERVAL
    }

    fn scan(&self) -> Result<Vec<DiskEntry>, TtsError> {
        let mut out = Vec::new();
        let read_dir = match std::fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => return Err(TtsError::CacheIOError(e.to_string())),
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            let Ok(bytes) = std::fs::read(&path) else { continue };
            let Ok(sidecar) = serde_json::from_slice::<Sidecar>(&bytes) else {
                warn!(key, "dropping unreadable cache sidecar");
                continue;
            };
            let size_bytes = std::fs::metadata(self.pcm_path(&key)).map(|m| m.len()).unwrap_or(0);
            out.push(DiskEntry { key, sidecar, size_bytes });
        }
        Ok(out)
    }
}

struct DiskEntry {
    key: String,
    sidecar: Sidecar,
    size_bytes: u64,
}

fn score(entry: &DiskEntry) -> f64 {
    let age_secs = entry_age(&entry.sidecar).as_secs_f64().max(1.0);
    let size_mb = (entry.size_bytes as f64 / (1024.0 * 1024.0)).max(0.01);
    let frequency = (entry.sidecar.access_count as f64) + 1.0;
    // Higher score = keep longer. Frequent, small, recently-aged entries score high.
    frequency / (age_secs * size_mb)
}

fn entry_age(sidecar: &Sidecar) -> Duration {
    let created = sidecar.created_unix_secs;
    let now = now_unix_secs();
    Duration::from_secs(now.saturating_sub(created))
}

fn now_unix_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn write_sidecar(path: &Path, sidecar: &Sidecar) -> Result<(), TtsError> {
    let bytes = serde_json::to_vec(sidecar).map_err(|e| TtsError::CacheIOError(e.to_string()))?;
    std::fs::write(path, bytes).map_err(|e| TtsError::CacheIOError(e.to_string()))
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), TtsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(DIR_MODE))
        .map_err(|e| TtsError::CacheIOError(e.to_string()))
}

#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), TtsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), TtsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))
        .map_err(|e| TtsError::CacheIOError(e.to_string()))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), TtsError> {
    Ok(())
}

impl Drop for DiskCache {
    fn drop(&mut self) {
        debug!(dir = %self.dir.display(), "disk cache handle dropped");
    }
}

pub fn default_capacity_bytes() -> u64 {
    DEFAULT_CAPACITY_BYTES
}

#[cfg(test)]
mod tests {
    use super::*;
    use glow_tts_core::audio::{AudioFormat, SampleFormat};

    fn audio_of(len: usize) -> Audio {
        Audio::new(
            vec![1u8; len],
            AudioFormat {
                sample_rate: 16_000,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        )
    }

    #[test]
    fn put_then_get_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path().to_path_buf(), 1024 * 1024).unwrap();
        cache.put("k1", &audio_of(100)).unwrap();
        let got = cache.get("k1").unwrap();
        assert_eq!(got.len(), 100);
    }

    #[test]
    fn missing_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path().to_path_buf(), 1024 * 1024).unwrap();
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_ttl(tmp.path().to_path_buf(), 1024 * 1024, Duration::from_secs(0)).unwrap();
        cache.put("k1", &audio_of(10)).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn evicts_to_stay_under_capacity() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(tmp.path().to_path_buf(), 150).unwrap();
        cache.put("a", &audio_of(100)).unwrap();
        cache.put("b", &audio_of(100)).unwrap();
        let total: u64 = cache.scan().unwrap().iter().map(|e| e.size_bytes).sum();
        assert!(total <= 150);
    }

    #[test]
    fn purge_expired_removes_only_stale_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = DiskCache::with_ttl(tmp.path().to_path_buf(), 1024 * 1024, Duration::from_secs(3600)).unwrap();
        cache.put("fresh", &audio_of(10)).unwrap();
        let removed = cache.purge_expired().unwrap();
        assert_eq!(removed, 0);
        assert!(cache.get("fresh").is_some());
    }
}
