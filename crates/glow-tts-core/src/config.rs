//! Typed configuration structs. These are the load target for an external
//! YAML/env loader (out of scope here — see the crate root docs); everything
//! in this module is already-parsed data plus validation.

use std::path::PathBuf;

/// Which synthesis engine the controller starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineChoice {
    Piper,
    Gtts,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PiperConfig {
    /// Model file path. `None` means "auto-discover".
    pub model: Option<PathBuf>,
    /// Playback speed multiplier, range `[0.1, 3.0]`.
    pub speed: f64,
    pub sample_rate: u32,
}

impl Default for PiperConfig {
    fn default() -> Self {
        Self {
            model: None,
            speed: 1.0,
            sample_rate: 22_050,
        }
    }
}

impl PiperConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.1..=3.0).contains(&self.speed) {
            return Err(format!("tts.piper.speed {} out of range [0.1, 3.0]", self.speed));
        }
        if let Some(path) = &self.model {
            if !path.exists() {
                return Err(format!("tts.piper.model {} does not exist", path.display()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GttsConfig {
    /// BCP-47 subset language code, 2-5 chars.
    pub language: String,
    pub slow: bool,
    pub sample_rate: u32,
}

impl Default for GttsConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            slow: false,
            sample_rate: 24_000,
        }
    }
}

impl GttsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(2..=5).contains(&self.language.len()) {
            return Err(format!("tts.gtts.language {:?} must be 2-5 characters", self.language));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    pub dir: PathBuf,
    /// Memory (L1) tier capacity, in bytes. The disk (L2) tier defaults to 10x this.
    pub max_size_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_size_bytes: 100 * 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn disk_capacity_bytes(&self) -> u64 {
        self.max_size_bytes * 10
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size_bytes == 0 {
            return Err("tts.cache.max_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

fn default_cache_dir() -> PathBuf {
    dirs_cache_home().join("glow-tts")
}

/// Minimal `~/.cache` resolution without pulling in a directories crate:
/// honors `XDG_CACHE_HOME`, else falls back to `$HOME/.cache`.
fn dirs_cache_home() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cache")
}

/// Aggregate configuration for a controller session.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsConfig {
    pub engine: Option<EngineChoice>,
    pub cache: CacheConfig,
    pub piper: PiperConfig,
    pub gtts: GttsConfig,
    /// Sentences ahead of playback to keep pre-synthesized.
    pub lookahead: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: None,
            cache: CacheConfig::default(),
            piper: PiperConfig::default(),
            gtts: GttsConfig::default(),
            lookahead: 3,
        }
    }
}

impl TtsConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;
        self.piper.validate()?;
        self.gtts.validate()?;
        if self.lookahead == 0 {
            return Err("lookahead must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(TtsConfig::default().validate().is_ok());
    }

    #[test]
    fn piper_speed_out_of_range_is_rejected() {
        let mut cfg = PiperConfig::default();
        cfg.speed = 5.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn piper_missing_model_path_is_rejected() {
        let mut cfg = PiperConfig::default();
        cfg.model = Some(PathBuf::from("/nonexistent/model.onnx"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn gtts_language_length_is_enforced() {
        let mut cfg = GttsConfig::default();
        cfg.language = "x".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disk_tier_is_ten_times_memory_tier() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.disk_capacity_bytes(), cfg.max_size_bytes * 10);
    }

    #[test]
    fn zero_lookahead_is_rejected() {
        let mut cfg = TtsConfig::default();
        cfg.lookahead = 0;
        assert!(cfg.validate().is_err());
    }
}
