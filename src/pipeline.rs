//! Request-scoped synthesis: normalize, pick parameters, run Piper,
//! post-process. Each stage's failure is returned as-is; nothing retries.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::artifacts::{Artifact, ArtifactStore};
use crate::audio::AudioPostProcessor;
use crate::config::Config;
use crate::error::{Result, SynthesisError};
use crate::metrics::ProcessMetrics;
use crate::params::{SynthesisParameters, select_parameters};
use crate::text::normalize;
use crate::tts::PiperEngine;
use crate::voice::{Language, VoiceModel};

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SynthesisResult {
    pub artifact: Artifact,
    pub parameters: SynthesisParameters,
    pub metrics: ProcessMetrics,
    pub language: Language,
    pub model_used: &'static str,
    pub is_question: bool,
    /// Length of the text as submitted, before normalization.
    pub text_characters: usize,
}

pub struct Synthesizer {
    config: Arc<Config>,
    store: Arc<ArtifactStore>,
    engine: PiperEngine,
    post: AudioPostProcessor,
}

impl Synthesizer {
    pub fn new(config: Arc<Config>, store: Arc<ArtifactStore>) -> Self {
        let engine = PiperEngine::new(
            config.piper_executable.clone(),
            Arc::clone(&store),
            config.sample_interval,
        );
        let post = AudioPostProcessor::new(
            config.ffmpeg_executable.clone(),
            Arc::clone(&store),
            config.mp3_bitrate.clone(),
        );
        Self {
            config,
            store,
            engine,
            post,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Request checks that need no I/O.
    pub fn validate(&self, request: &SynthesisRequest) -> Result<&'static VoiceModel> {
        if request.text.trim().is_empty() {
            return Err(SynthesisError::Validation("Text cannot be empty".to_string()));
        }
        if request.language.trim().is_empty() {
            return Err(SynthesisError::Validation(
                "Language must be specified".to_string(),
            ));
        }
        let chars = request.text.chars().count();
        if chars > self.config.max_text_chars {
            return Err(SynthesisError::Validation(format!(
                "Text is {} characters long, the limit is {}",
                chars, self.config.max_text_chars
            )));
        }
        let language: Language = request.language.parse().map_err(SynthesisError::Validation)?;
        Ok(VoiceModel::for_language(language))
    }

    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<SynthesisResult> {
        let voice = self.validate(request)?;

        let normalized = normalize(&request.text, voice.language);
        if normalized.text.trim().is_empty() {
            return Err(SynthesisError::Validation(
                "Text cannot be empty after processing".to_string(),
            ));
        }

        let model_path = voice.model_path(&self.config.models_dir);
        if !tokio::fs::try_exists(&model_path).await.unwrap_or(false) {
            return Err(SynthesisError::EngineStartup(format!(
                "Model file not found: {}. Please ensure the model file exists in the models directory",
                model_path.display()
            )));
        }

        if normalized.is_question {
            info!("Question detected - applying enhanced prosody");
        }
        let parameters = select_parameters(normalized.is_question);
        let preview: String = normalized.text.chars().take(50).collect();
        info!(
            "Generating audio for: {}... with language: {} (model: {})",
            preview.trim_end(),
            voice.language,
            voice.name
        );

        let (raw, mut metrics) = self
            .engine
            .execute(
                &normalized.text,
                &model_path,
                &parameters,
                self.config.synthesis_timeout,
            )
            .await?;
        // Report what was spoken, not the pause padding fed to the engine.
        metrics.text_length = normalized.clean_chars;
        let artifact = self
            .post
            .post_process(raw, parameters.pitch_shift_semitones)
            .await?;

        info!(
            "Synthesized {} ({:.2}s audio, {} bytes)",
            artifact.filename(),
            artifact.duration_seconds,
            artifact.size_bytes
        );
        Ok(SynthesisResult {
            artifact,
            parameters,
            metrics,
            language: voice.language,
            model_used: voice.name,
            is_question: normalized.is_question,
            text_characters: request.text.chars().count(),
        })
    }
}
