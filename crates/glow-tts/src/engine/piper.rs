//! Offline subprocess engine: invokes a Piper-compatible binary per call.
//!
//! Invocation discipline (violating any of these is a bug, not a style choice):
//! the full input text is written to a temp file and rewound *before* the
//! process is spawned, so stdin is a fully-materialized, already-seekable
//! stream the moment the child starts reading — this sidesteps the
//! write-after-spawn race where the child can observe EOF before the write
//! completes. Stdout/stderr are piped and drained concurrently with `wait()`
//! to avoid deadlocking on a full pipe buffer. Every call is deadline-bound,
//! and a fresh process is spawned per call (no persistent subprocess pool).

use std::io::{Seek, SeekFrom, Write};
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

const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;
const KILL_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PiperEngine {
    pub binary: PathBuf,
    pub model: PathBuf,
    pub sample_rate: u32,
    pub deadline: Duration,
}

impl PiperEngine {
    pub fn new(binary: PathBuf, model: PathBuf) -> Self {
        Self {
            binary,
            model,
            sample_rate: 22_050,
            deadline: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl SynthesisEngine for PiperEngine {
    async fn synthesize(&self, text: &str, speed: f64) -> Result<Audio, TtsError> {
        let length_scale = 1.0 / speed.clamp(0.5, 2.0);

        let mut stdin_file = tempfile::tempfile()
            .map_err(|e| TtsError::EngineUnavailable(format!("stdin tempfile: {e}")))?;
        stdin_file
            .write_all(text.as_bytes())
            .map_err(|e| TtsError::EngineUnavailable(format!("stdin write: {e}")))?;
        stdin_file
            .seek(SeekFrom::Start(0))
            .map_err(|e| TtsError::EngineUnavailable(format!("stdin seek: {e}")))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--model")
            .arg(&self.model)
            .arg("--output-raw")
            .arg("--length-scale")
            .arg(format!("{length_scale:.3}"))
            .stdin(Stdio::from(stdin_file))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(binary = %self.binary.display(), length_scale, "spawning piper");
        let mut child = cmd
            .spawn()
            .map_err(|e| TtsError::EngineUnavailable(format!("spawn piper: {e}")))?;

        let mut stdout = child.stdout.take().expect("stdout was piped");
        let mut stderr = child.stderr.take().expect("stderr was piped");

        let run = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (out_res, err_res) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            out_res.map_err(|e| TtsError::EngineUnavailable(format!("read stdout: {e}")))?;
            err_res.map_err(|e| TtsError::EngineUnavailable(format!("read stderr: {e}")))?;
            let status = child
                .wait()
                .await
                .map_err(|e| TtsError::EngineUnavailable(format!("wait: {e}")))?;
            Ok::<_, TtsError>((out, err, status))
        };

        let (out, err, status) = match tokio::time::timeout(self.deadline, run).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                warn!(deadline = ?self.deadline, "piper call exceeded deadline, killing");
                tokio::time::sleep(KILL_GRACE).await;
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(TtsError::SynthesisTimeout(self.deadline));
            }
        };

        if !status.success() {
            return Err(TtsError::EngineUnavailable(format!(
                "piper exited with {status}: {}",
                String::from_utf8_lossy(&err)
            )));
        }
        if out.is_empty() {
            return Err(TtsError::EngineUnavailable("piper produced empty output".into()));
        }
        if out.len() > MAX_OUTPUT_BYTES {
            return Err(TtsError::EngineUnavailable(format!(
                "piper output {} bytes exceeds sanity bound",
                out.len()
            )));
        }

        Ok(Audio::new(
            out,
            AudioFormat {
                sample_rate: self.sample_rate,
                channels: 1,
                sample_format: SampleFormat::Signed16Le,
            },
        ))
    }

    fn info(&self) -> EngineInfo {
        EngineInfo {
            name: "piper",
            sample_rate: self.sample_rate,
            channels: 1,
            bit_depth: 16,
            max_text_len: 5_000,
            online: false,
        }
    }

    async fn validate(&self) -> Result<(), TtsError> {
        if !self.binary.exists() {
            return Err(TtsError::EngineUnavailable(format!(
                "piper binary not found at {}",
                self.binary.display()
            )));
        }
        if !self.model.exists() {
            return Err(TtsError::EngineUnavailable(format!(
                "piper model not found at {}",
                self.model.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_rejects_missing_binary() {
        let engine = PiperEngine::new(PathBuf::from("/nonexistent/piper"), PathBuf::from("/nonexistent/model.onnx"));
        let result = engine.validate().await;
        assert!(matches!(result, Err(TtsError::EngineUnavailable(_))));
    }

    #[test]
    fn speed_maps_inversely_to_length_scale() {
        let fast_scale = 1.0 / 2.0_f64.clamp(0.5, 2.0);
        let slow_scale = 1.0 / 0.5_f64.clamp(0.5, 2.0);
        assert!(fast_scale < slow_scale);
    }
}
