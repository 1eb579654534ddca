use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, resolve_public_url};

#[derive(Parser, Debug)]
#[clap(name = "piper-serve", version, about = "Text-to-speech service around the Piper engine")]
pub struct Args {
    #[clap(flatten)]
    pub settings: Settings,

    #[clap(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP service and the artifact cleanup loop (default).
    Serve,
    /// Synthesize one utterance and print the result record as JSON.
    Say {
        #[clap(long, default_value = "en")]
        language: String,

        text: String,
    },
    /// Download missing or truncated voice models.
    FetchModels,
}

#[derive(clap::Args, Debug)]
pub struct Settings {
    #[clap(long, global = true, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[clap(long, global = true, env = "PORT", default_value_t = crate::config::DEFAULT_PORT)]
    pub port: u16,

    #[clap(long, global = true, env = "AUDIO_DIR", default_value = "./generated_audio")]
    pub audio_dir: PathBuf,

    #[clap(long, global = true, env = "MODELS_DIR", default_value = "./models")]
    pub models_dir: PathBuf,

    #[clap(long, global = true, env = "PIPER_EXECUTABLE", default_value = "piper")]
    pub piper: PathBuf,

    #[clap(long, global = true, env = "FFMPEG_EXECUTABLE", default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    #[clap(long, global = true, env = "SYNTHESIS_TIMEOUT_SECS", default_value_t = 45)]
    pub timeout_secs: u64,

    #[clap(long, global = true, env = "SAMPLE_INTERVAL_MS", default_value_t = 100)]
    pub sample_interval_ms: u64,

    #[clap(long, global = true, env = "CLEANUP_INTERVAL_SECS", default_value_t = 300)]
    pub cleanup_interval_secs: u64,

    #[clap(long, global = true, env = "FILE_EXPIRY_SECS", default_value_t = 3600)]
    pub file_expiry_secs: u64,

    #[clap(long, global = true, env = "MAX_TEXT_CHARS", default_value_t = 5000)]
    pub max_text_chars: usize,

    #[clap(long, global = true, env = "MP3_BITRATE", default_value = "192k")]
    pub mp3_bitrate: String,
}

impl Settings {
    pub fn into_config(self) -> Config {
        let public_url = resolve_public_url(|key| std::env::var(key).ok(), self.port);
        Config {
            host: self.host,
            port: self.port,
            audio_dir: self.audio_dir,
            models_dir: self.models_dir,
            piper_executable: self.piper,
            ffmpeg_executable: self.ffmpeg,
            synthesis_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            sample_interval: Duration::from_millis(self.sample_interval_ms.max(10)),
            cleanup_interval: Duration::from_secs(self.cleanup_interval_secs.max(1)),
            file_expiry: Duration::from_secs(self.file_expiry_secs),
            max_text_chars: self.max_text_chars,
            mp3_bitrate: self.mp3_bitrate,
            public_url,
        }
    }
}
