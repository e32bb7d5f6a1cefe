//! Online engine: `gtts-cli` writes a compressed file, then a transcoder
//! subprocess (e.g. `ffmpeg`) converts it to PCM. Both stages share the same
//! deadline-and-kill discipline as the offline engine; the gTTS stage is
//! additionally rate-limited and retried with bounded exponential backoff.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use glow_tts_core::audio::{Audio, AudioFormat, SampleFormat};
use glow_tts_core::error::TtsError;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{EngineInfo, SynthesisEngine};
use crate::token_bucket::TokenBucket;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug)]
pub struct GttsEngine {
    pub gtts_binary: PathBuf,
    pub transcoder_binary: PathBuf,
    pub language: String,
    pub slow: bool,
    pub sample_rate: u32,
    pub deadline: Duration,
    rate_limiter: TokenBucket,
}

impl GttsEngine {
    pub fn new(gtts_binary: PathBuf, transcoder_binary: PathBuf, language: String) -> Self {
        Self {
            gtts_binary,
            transcoder_binary,
            language,
            slow: false,
            sample_rate: 24_000,
            deadline: Duration::from_secs(10),
            rate_limiter: TokenBucket::new(1.0, 3),
        }
    }

    async fn run_gtts_once(&self, text: &str, out_path: &std::path::Path) -> Result<(), TtsError> {
        let mut cmd = Command::new(&self.gtts_binary);
        cmd.arg("--text")
            .arg(text)
            .arg("--lang")
            .arg(&self.language)
            .arg("--output")
            .arg(out_path);
        if self.slow {
            cmd.arg("--slow");
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| TtsError::NetworkUnavailable(format!("spawn gtts-cli: {e}")))?;
        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let run = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let _ = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            let status = child.wait().await.map_err(|e| TtsError::NetworkUnavailable(e.to_string()))?;
            Ok::<_, TtsError>((err, status))
        };

        let (err, status) = match tokio::time::timeout(self.deadline, run).await {
            Ok(r) => r?,
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(TtsError::SynthesisTimeout(self.deadline));
            }
        };

        if !status.success() {
            let message = String::from_utf8_lossy(&err).to_lowercase();
            if message.contains("network") || message.contains("connection") || message.contains("resolve") {
                return Err(TtsError::NetworkUnavailable(message.into_owned()));
            }
            return Err(TtsError::EngineUnavailable(format!("gtts-cli exited with {status}")));
        }
        Ok(())
    }

    async fn transcode(&self, in_path: &std::path::Path) -> Result<Vec<u8>, TtsError> {
        let mut cmd = Command::new(&self.transcoder_binary);
        cmd.arg("-i")
            .arg(in_path)
            .arg("-f")
            .arg("s16le")
            .arg("-ar")
            .arg(self.sample_rate.to_string())
            .arg("-ac")
            .arg("1")
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| TtsError::TranscodeFailed(format!("spawn transcoder: {e}")))?;
        let mut stdout = child.stdout.take().expect("stdout piped");
        let mut stderr = child.stderr.take().expect("stderr piped");

        let run = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (o, e) = tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            o.map_err(|e| TtsError::TranscodeFailed(e.to_string()))?;
            e.map_err(|e| TtsError::TranscodeFailed(e.to_string()))?;
            let status = child.wait().await.map_err(|e| TtsError::TranscodeFailed(e.to_string()))?;
            Ok::<_, TtsError>((out, err, status))
        };

        let (out, err, status) = match tokio::time::timeout(self.deadline, run).await {
            Ok(r) => r?,
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(TtsError::SynthesisTimeout(self.deadline));
            }
        };

        if !status.success() || out.is_empty() {
            return Err(TtsError::TranscodeFailed(format!(
                "transcoder exited with {status}: {}",
                String::from_utf8_lossy(&err)
            )));
        }
        if out.len() > MAX_OUTPUT_BYTES {
            return Err(TtsError::TranscodeFailed("transcoded output exceeds sanity bound".into()));
        }
        Ok(out)
    }
}

#[async_trait]
impl SynthesisEngine for GttsEngine {
    async fn synthesize(&self, text: &str, _speed: f64) -> Result<Audio, TtsError> {
        if !self.rate_limiter.try_acquire().await {
            return Err(TtsError::RateLimited);
        }

        let tmp_dir = tempfile::tempdir().map_err(|e| TtsError::EngineUnavailable(e.to_string()))?;
        let compressed_path = tmp_dir.path().join("gtts_output.mp3");

        let mut attempt = 0u32;
        let mut backoff = BASE_BACKOFF;
        loop {
            match self.run_gtts_once(text, &compressed_path).await {
                Ok(()) => break,
                Err(err) if err.recoverable() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %err, "gtts-cli call failed, retrying after backoff");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                Err(err) => return Err(err),
            }
        }

        debug!(path = %compressed_path.display(), "transcoding gtts output");
        let pcm = self.transcode(&compressed_path).await?;

        Ok(Audio::new(
            pcm,
            AudioFormat {
                sample_rate: self.sample_rate,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        ))
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "gtts",
            sample_rate: self.sample_rate,
            channels: 1,
            bit_depth: 16,
            max_text_len: 5_000,
            online: true,
        }
    }

    async fn validate(&self) -> Result<(), TtsError> {
        if !self.gtts_binary.exists() && which_on_path(&self.gtts_binary).is_none() {
            return Err(TtsError::EngineUnavailable(format!(
                "gtts-cli not found: {}",
                self.gtts_binary.display()
            )));
        }
        if !self.transcoder_binary.exists() && which_on_path(&self.transcoder_binary).is_none() {
            return Err(TtsError::EngineUnavailable(format!(
                "transcoder not found: {}",
                self.transcoder_binary.display()
            )));
        }
        Ok(())
    }
}

fn which_on_path(binary: &std::path::Path) -> Option<PathBuf> {
    let name = binary.file_name()?;
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_rejects_missing_binaries() {
        let engine = GttsEngine::new(
            PathBuf::from("/nonexistent/gtts-cli"),
            PathBuf::from("/nonexistent/ffmpeg"),
            "en".to_string(),
        );
        assert!(engine.validate().await.is_err());
    }

    #[tokio::test]
    async fn synthesize_is_rate_limited_after_burst() {
        let engine = GttsEngine::new(
            PathBuf::from("/nonexistent/gtts-cli"),
            PathBuf::from("/nonexistent/ffmpeg"),
            "en".to_string(),
        );
        for _ in 0..3 {
            assert!(engine.rate_limiter.try_acquire().await);
        }
        let result = engine.synthesize("hello", 1.0).await;
        assert!(matches!(result, Err(TtsError::RateLimited)));
    }
}
