//! Persistent settings file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::types::{
    default_audio_queue_capacity, default_client_id, default_fetch_timeout_secs, PipelineConfig,
    SessionConfig, SynthesisParams,
};
use crate::error::SpeakerError;

const APP_DIR: &str = "tts-speaker";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_client_id")]
    pub client_id: String,

    // Voice
    #[serde(default)]
    pub params: SynthesisParams,

    // Pipeline
    #[serde(default = "default_audio_queue_capacity")]
    pub audio_queue_capacity: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub resume_fetch_on_drain: bool,

    // Cache
    #[serde(default)]
    pub cache_enabled: bool,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            client_id: default_client_id(),
            params: SynthesisParams::default(),
            audio_queue_capacity: default_audio_queue_capacity(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            resume_fetch_on_drain: false,
            cache_enabled: false,
            cache_dir: None,
        }
    }
}

impl Settings {
    /// `<config_dir>/tts-speaker/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_default()
            .join(APP_DIR)
            .join("config.json")
    }

    /// Default cache location, falling back to the temp dir.
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(APP_DIR)
            .join("cache")
    }

    /// Load settings; a missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, SpeakerError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|source| SpeakerError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SpeakerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    pub fn session_config(&self) -> Result<SessionConfig, SpeakerError> {
        self.params.validate()?;
        Ok(SessionConfig::new(&self.client_id, self.params.clone()))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let cache_dir = if self.cache_enabled {
            Some(
                self.cache_dir
                    .clone()
                    .unwrap_or_else(Self::default_cache_dir),
            )
        } else {
            None
        };
        PipelineConfig {
            audio_queue_capacity: self.audio_queue_capacity.max(1),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs.max(1)),
            resume_fetch_on_drain: self.resume_fetch_on_drain,
            cache_dir,
        }
    }
}
