//! Core types for session state and synthesis parameters.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::SpeakerError;

// --- CONSTANTS ---
pub const DEFAULT_AUDIO_QUEUE_CAPACITY: usize = 10;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 5;
/// Client id used when none is configured.
pub const FALLBACK_CLIENT_ID: &str = "00-00-00-00-00-00";
/// Upper bound (exclusive) for speed, pitch and volume is 16.
pub const MAX_LEVEL: u8 = 15;

// --- VOICE ENUM ---
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Voice {
    #[default]
    Female,
    Male,
    DuXiaoYao, // 情感合成-度逍遥
    DuYaYa,    // 情感合成-度丫丫
}

impl Voice {
    /// Value of the `per` request parameter.
    pub fn code(self) -> u32 {
        match self {
            Voice::Female => 0,
            Voice::Male => 1,
            Voice::DuXiaoYao => 3,
            Voice::DuYaYa => 4,
        }
    }
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "female" | "0" => Ok(Voice::Female),
            "male" | "1" => Ok(Voice::Male),
            "du_xiao_yao" | "3" => Ok(Voice::DuXiaoYao),
            "du_ya_ya" | "4" => Ok(Voice::DuYaYa),
            other => Err(format!(
                "unknown voice '{other}' (female, male, du_xiao_yao, du_ya_ya)"
            )),
        }
    }
}

// --- AUDIO FORMAT ENUM ---
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Pcm16k,
    Pcm8k,
    Wav,
}

impl AudioFormat {
    /// Value of the `aue` request parameter.
    pub fn code(self) -> u32 {
        match self {
            AudioFormat::Mp3 => 3,
            AudioFormat::Pcm16k => 4,
            AudioFormat::Pcm8k => 5,
            AudioFormat::Wav => 6,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Pcm16k | AudioFormat::Pcm8k => "pcm",
            AudioFormat::Wav => "wav",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(AudioFormat::Mp3),
            "pcm16k" | "pcm-16k" => Ok(AudioFormat::Pcm16k),
            "pcm8k" | "pcm-8k" => Ok(AudioFormat::Pcm8k),
            "wav" => Ok(AudioFormat::Wav),
            other => Err(format!("unknown format '{other}' (mp3, pcm16k, pcm8k, wav)")),
        }
    }
}

/// Voice parameters sent with every synthesis request.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SynthesisParams {
    #[serde(default)]
    pub voice: Voice,
    #[serde(default = "default_level")]
    pub speed: u8,
    #[serde(default = "default_level")]
    pub pitch: u8,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub format: AudioFormat,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            voice: Voice::Female,
            speed: default_level(),
            pitch: default_level(),
            volume: default_volume(),
            format: AudioFormat::Mp3,
        }
    }
}

impl SynthesisParams {
    pub fn validate(&self) -> Result<(), SpeakerError> {
        for (name, value) in [
            ("speed", self.speed),
            ("pitch", self.pitch),
            ("volume", self.volume),
        ] {
            if value > MAX_LEVEL {
                return Err(SpeakerError::InvalidParam { name, value });
            }
        }
        Ok(())
    }
}

/// API key / secret key pair for the client-credentials grant.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(api_key: &str, secret_key: &str) -> Result<Self, SpeakerError> {
        let api_key = api_key.trim();
        let secret_key = secret_key.trim();
        if api_key.is_empty() || secret_key.is_empty() {
            return Err(SpeakerError::MissingCredentials);
        }
        Ok(Self {
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Access token with its absolute expiry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn from_expires_in(token: impl Into<String>, expires_in_secs: i64) -> Self {
        let expires_at = chrono::TimeDelta::try_seconds(expires_in_secs)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// What the fetch stage needs from the session for one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthContext {
    pub access_token: String,
    pub client_id: String,
}

/// Mutable session record: credentials, token, client id and voice params.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub credentials: Option<Credentials>,
    pub access_token: Option<AccessToken>,
    pub client_id: String,
    pub params: SynthesisParams,
}

/// Session shared between the controller (writer) and the fetch worker (reader).
pub type SharedSession = Arc<RwLock<SessionConfig>>;

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(FALLBACK_CLIENT_ID, SynthesisParams::default())
    }
}

impl SessionConfig {
    pub fn new(client_id: &str, params: SynthesisParams) -> Self {
        let client_id = if client_id.trim().is_empty() {
            FALLBACK_CLIENT_ID.to_string()
        } else {
            client_id.trim().to_string()
        };
        Self {
            credentials: None,
            access_token: None,
            client_id,
            params,
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn is_initialized(&self) -> bool {
        self.access_token
            .as_ref()
            .is_some_and(|t| !t.is_expired_at(Utc::now()))
    }

    /// Token and client id for a synthesis call.
    pub fn auth(&self) -> Result<AuthContext, SpeakerError> {
        match &self.access_token {
            Some(token) if !token.is_expired_at(Utc::now()) => Ok(AuthContext {
                access_token: token.token.clone(),
                client_id: self.client_id.clone(),
            }),
            _ => Err(SpeakerError::NotInitialized),
        }
    }
}

/// Tuning for the fetch/playback pipeline.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Audio queue length at which fetching pauses.
    pub audio_queue_capacity: usize,
    pub fetch_timeout: Duration,
    /// Let the playback worker wake the fetch worker after freeing capacity.
    pub resume_fetch_on_drain: bool,
    /// Where fetched clips are copied, if anywhere.
    pub cache_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audio_queue_capacity: DEFAULT_AUDIO_QUEUE_CAPACITY,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            resume_fetch_on_drain: false,
            cache_dir: None,
        }
    }
}

// --- Default Function Helpers ---
pub fn default_level() -> u8 {
    5
}
pub fn default_volume() -> u8 {
    9
}
pub fn default_client_id() -> String {
    FALLBACK_CLIENT_ID.to_string()
}
pub fn default_audio_queue_capacity() -> usize {
    DEFAULT_AUDIO_QUEUE_CAPACITY
}
pub fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}
