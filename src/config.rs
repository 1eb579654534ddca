use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;

/// Process-wide settings, built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub audio_dir: PathBuf,
    pub models_dir: PathBuf,
    pub piper_executable: PathBuf,
    pub ffmpeg_executable: PathBuf,
    pub synthesis_timeout: Duration,
    pub sample_interval: Duration,
    pub cleanup_interval: Duration,
    pub file_expiry: Duration,
    pub max_text_chars: usize,
    pub mp3_bitrate: String,
    pub public_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            audio_dir: PathBuf::from("./generated_audio"),
            models_dir: PathBuf::from("./models"),
            piper_executable: PathBuf::from("piper"),
            ffmpeg_executable: PathBuf::from("ffmpeg"),
            synthesis_timeout: Duration::from_secs(45),
            sample_interval: Duration::from_millis(100),
            cleanup_interval: Duration::from_secs(300),
            file_expiry: Duration::from_secs(3600),
            max_text_chars: 5000,
            mp3_bitrate: "192k".to_string(),
            public_url: format!("http://localhost:{}", DEFAULT_PORT),
        }
    }
}

impl Config {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn audio_url(&self, filename: &str) -> String {
        format!("{}/audio/{}", self.public_url.trim_end_matches('/'), filename)
    }
}

/// Picks the externally reachable base URL. Hosting platforms win over an
/// explicit `PUBLIC_URL`, which wins over localhost.
pub fn resolve_public_url<F>(lookup: F, port: u16) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(domain) = non_empty("RAILWAY_PUBLIC_DOMAIN") {
        format!("https://{}", domain)
    } else if let Some(url) = non_empty("RENDER_EXTERNAL_URL") {
        url
    } else if let Some(url) = non_empty("PUBLIC_URL") {
        url
    } else {
        format!("http://localhost:{}", port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn public_url_prefers_railway() {
        let url = resolve_public_url(
            env(&[
                ("RAILWAY_PUBLIC_DOMAIN", "tts.up.railway.app"),
                ("PUBLIC_URL", "http://example.com"),
            ]),
            8000,
        );
        assert_eq!(url, "https://tts.up.railway.app");
    }

    #[test]
    fn public_url_falls_back_to_localhost() {
        assert_eq!(resolve_public_url(env(&[]), 9000), "http://localhost:9000");
        assert_eq!(
            resolve_public_url(env(&[("PUBLIC_URL", "  ")]), 9000),
            "http://localhost:9000"
        );
    }

    #[test]
    fn audio_url_joins_without_double_slash() {
        let config = Config {
            public_url: "https://tts.example.com/".to_string(),
            ..Config::default()
        };
        assert_eq!(
            config.audio_url("abc.mp3"),
            "https://tts.example.com/audio/abc.mp3"
        );
    }
}
