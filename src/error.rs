use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Synthesis,
    PostProcessing,
    Storage,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Validation => "validation",
            Stage::Synthesis => "synthesis",
            Stage::PostProcessing => "post_processing",
            Stage::Storage => "storage",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("{0}")]
    Validation(String),

    #[error("synthesis engine unavailable: {0}")]
    EngineStartup(String),

    #[error("synthesis timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("post-processing failed: {0}")]
    PostProcessing(String),

    #[error("filesystem error on {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SynthesisError {
    pub fn stage(&self) -> Stage {
        match self {
            SynthesisError::Validation(_) => Stage::Validation,
            SynthesisError::EngineStartup(_)
            | SynthesisError::Timeout(_)
            | SynthesisError::Synthesis(_) => Stage::Synthesis,
            SynthesisError::PostProcessing(_) => Stage::PostProcessing,
            SynthesisError::Filesystem { .. } => Stage::Storage,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, SynthesisError::Validation(_))
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SynthesisError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SynthesisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_variant() {
        assert_eq!(SynthesisError::Validation("x".into()).stage(), Stage::Validation);
        assert_eq!(
            SynthesisError::Timeout(Duration::from_secs(45)).stage(),
            Stage::Synthesis
        );
        assert_eq!(
            SynthesisError::PostProcessing("ffmpeg".into()).stage(),
            Stage::PostProcessing
        );
        let fs = SynthesisError::fs("/tmp/x", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(fs.stage(), Stage::Storage);
    }

    #[test]
    fn timeout_message_names_the_bound() {
        let msg = SynthesisError::Timeout(Duration::from_secs(45)).to_string();
        assert_eq!(msg, "synthesis timed out after 45s");
    }
}
