use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::artifacts::{ArtifactId, ArtifactStore, PendingArtifact};
use crate::error::{Result, SynthesisError};
use crate::metrics::{ProcessMetrics, ResourceSamples, sample_process};
use crate::params::SynthesisParameters;

/// Waveform produced by the engine for one request. Dropping it removes the
/// request's files unless post-processing committed the artifact.
#[derive(Debug)]
pub struct RawAudio {
    pub id: ArtifactId,
    pub path: PathBuf,
    pub(crate) pending: PendingArtifact,
}

impl RawAudio {
    pub(crate) fn new(store: &Arc<ArtifactStore>, id: ArtifactId) -> Self {
        Self {
            id,
            path: store.raw_path(id),
            pending: store.pending(id),
        }
    }
}

/// Runs the Piper CLI as a child process, one process per utterance.
#[derive(Debug, Clone)]
pub struct PiperEngine {
    program: PathBuf,
    store: Arc<ArtifactStore>,
    sample_interval: Duration,
}

impl PiperEngine {
    pub fn new(program: impl Into<PathBuf>, store: Arc<ArtifactStore>, sample_interval: Duration) -> Self {
        Self {
            program: program.into(),
            store,
            sample_interval,
        }
    }

    /// Synthesizes `text` into a fresh `{id}.wav`, sampling the child's CPU
    /// and memory while it runs. On timeout the child is killed and reaped
    /// before its output is removed; on any failure or cancellation nothing
    /// is left on disk.
    pub async fn execute(
        &self,
        text: &str,
        model: &Path,
        params: &SynthesisParameters,
        limit: Duration,
    ) -> Result<(RawAudio, ProcessMetrics)> {
        let raw = RawAudio::new(&self.store, ArtifactId::new());
        let out_path = raw.path.clone();
        let text_length = text.trim_end().chars().count();
        info!("Calling Piper for {} ({} chars)", out_path.display(), text_length);

        let started = Instant::now();
        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(model)
            .arg("--output_file")
            .arg(&out_path)
            .args(params.engine_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.startup_error(e))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let sampler = child
            .id()
            .map(|pid| tokio::spawn(sample_process(pid, self.sample_interval, stop_rx)));

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let stdin = child.stdin.take();
        let run = async {
            if let Some(mut stdin) = stdin {
                // A broken pipe here means the engine bailed early; its exit
                // status carries the real error.
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    debug!("Writing text to Piper failed: {}", e);
                }
            }
            child.wait().await
        };
        let waited = timeout(limit, run).await;

        let _ = stop_tx.send(true);
        let samples = match sampler {
            Some(handle) => handle.await.unwrap_or_default(),
            None => ResourceSamples::default(),
        };
        let metrics = samples.finish(started.elapsed(), text_length);

        let status = match waited {
            Err(_) => {
                warn!("Piper exceeded {:?}, killing it", limit);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill Piper: {}", e);
                }
                if let Some(handle) = stderr_task {
                    handle.abort();
                }
                return Err(SynthesisError::Timeout(limit));
            }
            Ok(Err(e)) => {
                return Err(SynthesisError::Synthesis(format!(
                    "waiting for Piper failed: {}",
                    e
                )));
            }
            Ok(Ok(status)) => status,
        };

        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();

        if !status.success() {
            error!("Piper error ({}): {}", status, stderr);
            return Err(SynthesisError::Synthesis(format!(
                "Piper exited with {}: {}",
                status, stderr
            )));
        }

        match tokio::fs::metadata(&out_path).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => {
                return Err(SynthesisError::Synthesis(
                    "Piper produced an empty audio file".to_string(),
                ));
            }
            Err(_) => {
                return Err(SynthesisError::Synthesis(
                    "Audio file was not generated".to_string(),
                ));
            }
        }

        info!(
            "Piper finished {} in {:.2}s (cpu avg {:.1}%, mem peak {:.2} MB)",
            out_path.display(),
            metrics.processing_time_seconds,
            metrics.cpu_percent_average,
            metrics.memory_mb_peak
        );
        Ok((raw, metrics))
    }

    fn startup_error(&self, e: io::Error) -> SynthesisError {
        let reason = match e.kind() {
            io::ErrorKind::NotFound => "not found".to_string(),
            io::ErrorKind::PermissionDenied => "not executable".to_string(),
            _ => e.to_string(),
        };
        error!("Cannot start Piper at '{}': {}", self.program.display(), e);
        SynthesisError::EngineStartup(format!(
            "Piper executable '{}' {}. Please ensure Piper is installed and in PATH",
            self.program.display(),
            reason
        ))
    }
}
