//! Fetches Piper voices from Hugging Face when they are missing or when the
//! checkout only contains a Git LFS pointer.

use anyhow::Context;
use reqwest::header::USER_AGENT;
use std::path::Path;
use tracing::{info, warn};

use crate::voice::VoiceModel;

const VOICES_BASE_URL: &str = "https://huggingface.co/rhasspy/piper-voices/resolve/main";

/// Anything smaller is almost certainly an LFS pointer, not a model.
pub const MIN_MODEL_BYTES: u64 = 1_000_000;

pub async fn is_valid_file(path: &Path, min_bytes: u64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() >= min_bytes.max(1) => true,
        Ok(meta) => {
            warn!("{} is too small ({} bytes)", path.display(), meta.len());
            false
        }
        Err(_) => false,
    }
}

/// `(remote url, local path, minimum size)` for both files of a voice.
pub fn voice_files(voice: &VoiceModel, models_dir: &Path) -> [(String, std::path::PathBuf, u64); 2] {
    let base = format!("{}/{}/{}", VOICES_BASE_URL, voice.remote_dir, voice.file_name());
    [
        (
            format!("{}.onnx", base),
            voice.model_path(models_dir),
            MIN_MODEL_BYTES,
        ),
        (format!("{}.onnx.json", base), voice.config_path(models_dir), 1),
    ]
}

/// Downloads every configured voice file that is not already valid. Returns
/// how many files were fetched.
pub async fn ensure_models(models_dir: &Path) -> anyhow::Result<usize> {
    info!("Checking Piper voice models in {}", models_dir.display());
    let client = reqwest::Client::new();
    let mut fetched = 0;

    for voice in VoiceModel::all() {
        for (url, path, min_bytes) in voice_files(voice, models_dir) {
            if is_valid_file(&path, min_bytes).await {
                continue;
            }
            download(&client, &url, &path).await?;
            fetched += 1;
        }
    }

    if fetched == 0 {
        info!("All models are valid and ready to use");
    } else {
        info!("Model download complete ({} files)", fetched);
    }
    Ok(fetched)
}

async fn download(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    info!("Downloading {}", url);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = client
        .get(url)
        .header(USER_AGENT, "piper-serve/0.1")
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await
        .with_context(|| format!("reading body of {}", url))?;

    let part = dest.with_extension("part");
    tokio::fs::write(&part, &bytes)
        .await
        .with_context(|| format!("writing {}", part.display()))?;
    tokio::fs::rename(&part, dest).await?;
    info!(
        "Downloaded {} ({:.2} MB)",
        dest.display(),
        bytes.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(())
}
