//! HTTP surface: synthesis endpoint, health check and artifact downloads.

use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, warn};

use crate::artifacts::AudioFormat;
use crate::config::Config;
use crate::error::SynthesisError;
use crate::params::SynthesisParameters;
use crate::pipeline::{SynthesisRequest, SynthesisResult, Synthesizer};
use crate::voice::Language;

const SERVICE_NAME: &str = "Piper TTS Server";

pub fn build_app(synth: Arc<Synthesizer>) -> Router {
    let audio_dir = synth.store().dir().to_path_buf();
    let audio = Router::new()
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(middleware::from_fn(finished_artifacts_only));
    Router::new()
        .route("/health", get(health))
        .route("/synthesize", post(synthesize))
        .merge(audio)
        .layer(CorsLayer::permissive())
        .with_state(synth)
}

/// Intermediates share the artifact directory; only finished files are
/// downloadable.
async fn finished_artifacts_only(request: Request, next: Next) -> Response {
    let path = request.uri().path();
    let finished = AudioFormat::ALL
        .iter()
        .any(|format| path.ends_with(&format!(".{}", format.extension())));
    if finished {
        next.run(request).await
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok", "service": SERVICE_NAME}))
}

async fn synthesize(
    State(synth): State<Arc<Synthesizer>>,
    Json(request): Json<SynthesisRequest>,
) -> Response {
    match synth.synthesize(&request).await {
        Ok(result) => Json(SynthesizeResponse::new(&result, synth.config())).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(e: SynthesisError) -> Response {
    let status = if e.is_validation() {
        warn!("Rejected request: {}", e);
        StatusCode::BAD_REQUEST
    } else {
        error!("Synthesis failed in {} stage: {}", e.stage(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(serde_json::json!({"detail": e.to_string(), "stage": e.stage()})),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub status: &'static str,
    pub audio_url: String,
    pub filename: String,
    pub format: &'static str,
    pub language: Language,
    pub model_used: &'static str,
    pub is_question: bool,
    pub parameters: SynthesisParameters,
    pub resources: Resources,
}

#[derive(Debug, Serialize)]
pub struct Resources {
    pub text_length: usize,
    pub text_characters: usize,
    pub processing_time_seconds: f64,
    pub cpu_percent_average: f64,
    pub memory_mb_average: f64,
    pub memory_mb_peak: f64,
    pub audio_duration_seconds: f64,
    pub file_size_bytes: u64,
    pub file_size_kb: f64,
}

impl SynthesizeResponse {
    pub fn new(result: &SynthesisResult, config: &Config) -> Self {
        let artifact = &result.artifact;
        let filename = artifact.filename();
        Self {
            status: "success",
            audio_url: config.audio_url(&filename),
            filename,
            format: artifact.format.extension(),
            language: result.language,
            model_used: result.model_used,
            is_question: result.is_question,
            parameters: result.parameters,
            resources: Resources {
                text_length: result.metrics.text_length,
                text_characters: result.text_characters,
                processing_time_seconds: result.metrics.processing_time_seconds,
                cpu_percent_average: result.metrics.cpu_percent_average,
                memory_mb_average: result.metrics.memory_mb_average,
                memory_mb_peak: result.metrics.memory_mb_peak,
                audio_duration_seconds: artifact.duration_seconds,
                file_size_bytes: artifact.size_bytes,
                file_size_kb: (artifact.size_bytes as f64 / 1024.0 * 100.0).round() / 100.0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{ArtifactId, ArtifactStore};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_app(dir: &std::path::Path) -> Router {
        let config = Config {
            audio_dir: dir.to_path_buf(),
            models_dir: dir.join("models"),
            piper_executable: dir.join("no-such-piper"),
            ..Config::default()
        };
        let store = Arc::new(ArtifactStore::new(dir));
        build_app(Arc::new(Synthesizer::new(Arc::new(config), store)))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/synthesize")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_returns_200() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["status"], "ok");
    }

    #[tokio::test]
    async fn unsupported_language_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let res = test_app(dir.path())
            .oneshot(post_json(r#"{"text": "Bonjour", "language": "fr"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["stage"], "validation");
    }

    #[tokio::test]
    async fn empty_text_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let res = test_app(dir.path())
            .oneshot(post_json(r#"{"text": "  ", "language": "en"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_model_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let res = test_app(dir.path())
            .oneshot(post_json(r#"{"text": "Hello world!", "language": "en"}"#))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(res).await["stage"], "synthesis");
    }

    async fn get_status(app: Router, uri: &str) -> StatusCode {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(req).await.unwrap().status()
    }

    #[tokio::test]
    async fn only_finished_artifacts_are_served() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let id = ArtifactId::new();
        std::fs::write(store.raw_path(id), b"RIFF").unwrap();
        std::fs::write(store.pitched_path(id), b"RIFF").unwrap();
        std::fs::write(store.partial_path(id, AudioFormat::Mp3), b"ID3").unwrap();
        std::fs::write(store.artifact_path(id, AudioFormat::Mp3), b"ID3").unwrap();

        let app = test_app(dir.path());
        assert_eq!(get_status(app.clone(), &format!("/audio/{}.mp3", id)).await, StatusCode::OK);
        for name in [
            format!("{}.wav", id),
            format!("{}.pitched.wav", id),
            format!("{}.mp3.part", id),
        ] {
            let status = get_status(app.clone(), &format!("/audio/{}", name)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{name}");
        }
    }

    #[tokio::test]
    async fn unknown_audio_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let req = Request::builder()
            .uri("/audio/does-not-exist.mp3")
            .body(Body::empty())
            .unwrap();
        let res = test_app(dir.path()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
