use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use piper_serve::args::{Args, Command};
use piper_serve::artifacts::{ArtifactStore, spawn_cleanup};
use piper_serve::models::ensure_models;
use piper_serve::server::{SynthesizeResponse, build_app};
use piper_serve::{Config, SynthesisRequest, Synthesizer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Arc::new(args.settings.into_config());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Say { language, text } => say(config, language, text).await,
        Command::FetchModels => {
            ensure_models(&config.models_dir).await?;
            Ok(())
        }
    }
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    info!("Starting Piper TTS Server");
    let store = Arc::new(ArtifactStore::open(&config.audio_dir).await?);
    tokio::fs::create_dir_all(&config.models_dir)
        .await
        .with_context(|| format!("creating {}", config.models_dir.display()))?;
    info!("Audio files will be stored in: {}", config.audio_dir.display());
    info!("Loading models from: {}", config.models_dir.display());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cleanup = spawn_cleanup(
        Arc::clone(&store),
        config.cleanup_interval,
        config.file_expiry,
        shutdown_rx,
    );

    let synth = Arc::new(Synthesizer::new(Arc::clone(&config), store));
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("API accessible at: {}", config.public_url);

    axum::serve(listener, build_app(synth))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    cleanup.await?;
    info!("Server stopped");
    Ok(())
}

async fn say(config: Arc<Config>, language: String, text: String) -> anyhow::Result<()> {
    let store = Arc::new(ArtifactStore::open(&config.audio_dir).await?);
    let synth = Synthesizer::new(Arc::clone(&config), store);
    let result = synth.synthesize(&SynthesisRequest { text, language }).await?;
    let response = SynthesizeResponse::new(&result, &config);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}
