//! Text-to-speech service around the Piper engine: text normalization,
//! per-utterance voice parameters, subprocess execution with resource
//! sampling, ffmpeg post-processing and expiring artifacts.

pub mod args;
pub mod artifacts;
pub mod audio;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod params;
pub mod pipeline;
pub mod server;
pub mod text;
pub mod tts;
pub mod voice;

pub use artifacts::{Artifact, ArtifactId, ArtifactStore, AudioFormat};
pub use config::Config;
pub use error::{Stage, SynthesisError};
pub use metrics::ProcessMetrics;
pub use params::{SynthesisParameters, select_parameters};
pub use pipeline::{SynthesisRequest, SynthesisResult, Synthesizer};
pub use text::{Normalized, normalize};
pub use voice::{Language, VoiceModel};
