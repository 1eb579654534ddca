use chrono::Utc;
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{error, info};

use crate::artifacts::{Artifact, ArtifactStore, AudioFormat};
use crate::error::{Result, SynthesisError};
use crate::tts::RawAudio;

pub fn wav_duration_seconds(path: &Path) -> hound::Result<f64> {
    let reader = WavReader::open(path)?;
    Ok(duration_of(&reader))
}

fn duration_of<R: std::io::Read>(reader: &WavReader<R>) -> f64 {
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    frames / spec.sample_rate as f64
}

/// Sample rate and duration from the WAV header, read off the runtime.
async fn wav_header(path: &Path) -> Result<(u32, f64)> {
    let owned = path.to_path_buf();
    let read = tokio::task::spawn_blocking(move || {
        let reader = WavReader::open(&owned)?;
        Ok::<_, hound::Error>((reader.spec().sample_rate, duration_of(&reader)))
    })
    .await
    .map_err(|e| SynthesisError::PostProcessing(format!("reading {}: {}", path.display(), e)))?;
    read.map_err(|e| SynthesisError::PostProcessing(format!("reading {}: {}", path.display(), e)))
}

/// ffmpeg filter chain that raises pitch by `semitones` while keeping the
/// duration: play faster, resample back, then stretch tempo to compensate.
pub fn pitch_filter(sample_rate: u32, semitones: f32) -> String {
    let ratio = 2f64.powf(f64::from(semitones) / 12.0);
    let shifted_rate = (f64::from(sample_rate) * ratio).round() as u32;
    format!(
        "asetrate={},aresample={},atempo={:.6}",
        shifted_rate,
        sample_rate,
        1.0 / ratio
    )
}

/// Turns the engine's waveform into the delivered artifact using ffmpeg.
#[derive(Debug, Clone)]
pub struct AudioPostProcessor {
    ffmpeg: PathBuf,
    store: Arc<ArtifactStore>,
    bitrate: String,
    format: AudioFormat,
}

impl AudioPostProcessor {
    pub fn new(ffmpeg: impl Into<PathBuf>, store: Arc<ArtifactStore>, bitrate: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            store,
            bitrate: bitrate.into(),
            format: AudioFormat::Mp3,
        }
    }

    /// Either returns a complete artifact or leaves nothing of this request
    /// on disk.
    pub async fn post_process(&self, raw: RawAudio, pitch_shift_semitones: f32) -> Result<Artifact> {
        let id = raw.id;
        self.build_artifact(raw, pitch_shift_semitones)
            .await
            .inspect_err(|e| error!("Post-processing {} failed: {}", id, e))
    }

    async fn build_artifact(&self, raw: RawAudio, pitch_shift_semitones: f32) -> Result<Artifact> {
        let RawAudio { id, path, pending } = raw;
        let mut waveform = path;
        let (sample_rate, mut duration_seconds) = wav_header(&waveform).await?;

        if pitch_shift_semitones != 0.0 {
            let pitched = self.store.pitched_path(id);
            self.pitch_shift(&waveform, &pitched, sample_rate, pitch_shift_semitones)
                .await?;
            tokio::fs::remove_file(&waveform)
                .await
                .map_err(|e| SynthesisError::fs(&waveform, e))?;
            info!("Pitch shift of {:+} semitones applied: {}", pitch_shift_semitones, pitched.display());
            waveform = pitched;
            duration_seconds = wav_header(&waveform).await?.1;
        }

        let partial = self.store.partial_path(id, self.format);
        self.transcode(&waveform, &partial).await?;
        tokio::fs::remove_file(&waveform)
            .await
            .map_err(|e| SynthesisError::fs(&waveform, e))?;

        let final_path = self.store.artifact_path(id, self.format);
        tokio::fs::rename(&partial, &final_path)
            .await
            .map_err(|e| SynthesisError::fs(&final_path, e))?;

        let size_bytes = tokio::fs::metadata(&final_path)
            .await
            .map_err(|e| SynthesisError::fs(&final_path, e))?
            .len();
        if size_bytes == 0 {
            return Err(SynthesisError::PostProcessing(
                "encoder produced an empty file".to_string(),
            ));
        }

        pending.commit();
        info!("MP3 conversion successful: {} ({} bytes)", final_path.display(), size_bytes);
        Ok(Artifact {
            id,
            path: final_path,
            format: self.format,
            created_at: Utc::now(),
            duration_seconds: (duration_seconds * 100.0).round() / 100.0,
            size_bytes,
        })
    }

    async fn pitch_shift(&self, input: &Path, output: &Path, sample_rate: u32, semitones: f32) -> Result<()> {
        let mut cmd = self.ffmpeg_command();
        cmd.arg("-i")
            .arg(input)
            .arg("-af")
            .arg(pitch_filter(sample_rate, semitones))
            .arg(output);
        self.run(cmd, "pitch shift").await
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<()> {
        info!("Converting {} to {}...", input.display(), self.format.extension());
        let mut cmd = self.ffmpeg_command();
        cmd.arg("-i")
            .arg(input)
            .args(["-vn", "-codec:a", "libmp3lame", "-b:a"])
            .arg(&self.bitrate)
            .args(["-f", "mp3"])
            .arg(output);
        self.run(cmd, "mp3 conversion").await
    }

    fn ffmpeg_command(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-y", "-hide_banner", "-loglevel", "error"])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, step: &str) -> Result<()> {
        let output = cmd.output().await.map_err(|e| {
            SynthesisError::PostProcessing(format!(
                "{}: could not run '{}': {}",
                step,
                self.ffmpeg.display(),
                e
            ))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthesisError::PostProcessing(format!(
                "{} failed ({}): {}",
                step,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
