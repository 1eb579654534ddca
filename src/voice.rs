//! Installed Piper voices, one per supported language.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Es,
    En,
    Pt,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Es, Language::En, Language::Pt];

    pub fn code(self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
            Language::Pt => "pt",
        }
    }

    pub fn supported_codes() -> String {
        Language::ALL
            .iter()
            .map(|l| l.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "es" => Ok(Language::Es),
            "en" => Ok(Language::En),
            "pt" => Ok(Language::Pt),
            other => Err(format!(
                "Language '{}' not supported. Available languages: {}",
                other,
                Language::supported_codes()
            )),
        }
    }
}

/// A trained Piper model file, addressed relative to the models directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceModel {
    pub language: Language,
    /// `{lang}/{voice}` without extension, e.g. `en/en_GB-cori-high`.
    pub name: &'static str,
    /// Directory of the voice in the rhasspy/piper-voices repository.
    pub remote_dir: &'static str,
}

static VOICES: [VoiceModel; 3] = [
    VoiceModel {
        language: Language::Es,
        name: "es/es_MX-claude-high",
        remote_dir: "es/es_MX/claude/high",
    },
    VoiceModel {
        language: Language::En,
        name: "en/en_GB-cori-high",
        remote_dir: "en/en_GB/cori/high",
    },
    VoiceModel {
        language: Language::Pt,
        name: "pt/pt_BR-cadu-medium",
        remote_dir: "pt/pt_BR/cadu/medium",
    },
];

impl VoiceModel {
    pub fn for_language(language: Language) -> &'static VoiceModel {
        VOICES
            .iter()
            .find(|v| v.language == language)
            .unwrap_or(&VOICES[0])
    }

    pub fn all() -> &'static [VoiceModel] {
        &VOICES
    }

    pub fn file_name(&self) -> &'static str {
        self.name.rsplit('/').next().unwrap_or(self.name)
    }

    pub fn model_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("{}.onnx", self.name))
    }

    pub fn config_path(&self, models_dir: &Path) -> PathBuf {
        models_dir.join(format!("{}.onnx.json", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_has_a_voice() {
        for lang in Language::ALL {
            assert_eq!(VoiceModel::for_language(lang).language, lang);
        }
    }

    #[test]
    fn unknown_language_lists_supported_ones() {
        let err = "fr".parse::<Language>().unwrap_err();
        assert!(err.contains("'fr'"));
        assert!(err.contains("es, en, pt"));
    }

    #[test]
    fn model_paths_resolve_under_models_dir() {
        let voice = VoiceModel::for_language(Language::En);
        assert_eq!(
            voice.model_path(Path::new("models")),
            PathBuf::from("models/en/en_GB-cori-high.onnx")
        );
        assert_eq!(voice.file_name(), "en_GB-cori-high");
    }
}
