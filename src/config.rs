use crate::error::{Result, VoxcutError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Process configuration. Collaborator credentials and model identifiers are
/// injected into the collaborator wrappers at construction; nothing reads
/// this from global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API key for the transcription/translation collaborator.
    pub gemini_api_key: Option<String>,
    /// Separation model name; also the staging directory demucs writes under.
    pub demucs_model: String,
    /// External diarization command, invoked with the audio path appended.
    pub diarizer_command: String,
    /// Language spoken in the source recording.
    pub source_language: String,
    /// Fixed target language for the translated half of each transcript.
    pub target_language: String,
    /// Bounded concurrency for the per-segment loop. 1 = sequential,
    /// chronological order.
    pub concurrency: usize,
    /// Wall-clock limit for one separation subprocess.
    pub separation_timeout_secs: u64,
    /// Wall-clock limit for one diarization subprocess.
    pub diarization_timeout_secs: u64,
    /// Per-request limit for annotation API calls.
    pub annotation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            demucs_model: "htdemucs".to_string(),
            diarizer_command: "diarize".to_string(),
            source_language: "ta".to_string(),
            target_language: "en".to_string(),
            concurrency: 1,
            separation_timeout_secs: 600,
            diarization_timeout_secs: 600,
            annotation_timeout_secs: 120,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        // Load from config file if it exists
        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let contents = std::fs::read_to_string(&config_path)?;
                if let Ok(file_config) = toml::from_str::<Config>(&contents) {
                    config = file_config;
                }
            }
        }

        // Override with environment variables
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            config.gemini_api_key = Some(key);
        }
        if let Ok(model) = std::env::var("VOXCUT_DEMUCS_MODEL") {
            config.demucs_model = model;
        }
        if let Ok(command) = std::env::var("VOXCUT_DIARIZER") {
            config.diarizer_command = command;
        }
        if let Ok(lang) = std::env::var("VOXCUT_SOURCE_LANGUAGE") {
            config.source_language = lang;
        }
        if let Ok(lang) = std::env::var("VOXCUT_TARGET_LANGUAGE") {
            config.target_language = lang;
        }
        if let Ok(concurrency) = std::env::var("VOXCUT_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                config.concurrency = c;
            }
        }

        Ok(config)
    }

    /// Validate before a run. The API key is only required when the
    /// annotation stage is enabled.
    pub fn validate(&self, annotate: bool) -> Result<()> {
        if annotate && self.gemini_api_key.is_none() {
            return Err(VoxcutError::Config(
                "GEMINI_API_KEY not set. Export it, or pass --no-annotate to skip transcripts."
                    .to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(VoxcutError::Config(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.demucs_model.is_empty() {
            return Err(VoxcutError::Config(
                "Separation model name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("voxcut").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.demucs_model, "htdemucs");
        assert_eq!(config.target_language, "en");
        assert_eq!(config.concurrency, 1);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_validate_requires_key_only_for_annotation() {
        let config = Config::default();
        assert!(config.validate(true).is_err());
        assert!(config.validate(false).is_ok());

        let config = Config {
            gemini_api_key: Some("test-key".to_string()),
            ..Config::default()
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = Config {
            concurrency: 0,
            ..Config::default()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let config = Config {
            demucs_model: String::new(),
            ..Config::default()
        };
        assert!(config.validate(false).is_err());
    }
}
