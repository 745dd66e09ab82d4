//! Speech synthesis client for the Baidu short-text TTS service.
//!
//! Text submitted to [`TtsManager::speak`] is synthesized by a background
//! fetch worker and played, in submission order, by a background playback
//! worker. See [`api::tts`] for the pipeline.

pub mod api;
pub mod config;
pub mod error;

pub use api::token::{BaiduOAuth, CredentialExchange};
pub use api::tts::{
    AudioCache, AudioItem, AudioSink, BaiduSynthesizer, DevicePlayer, SpeechEvent,
    SpeechSynthesizer, SynthesisRequest, TtsManager, WorkerStatus,
};
pub use config::{PipelineConfig, SessionConfig, Settings, SynthesisParams};
pub use error::SpeakerError;
