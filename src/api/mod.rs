pub mod client;
pub mod token;
pub mod tts;

pub use token::{BaiduOAuth, CredentialExchange};
pub use tts::{AudioSink, SpeechSynthesizer, TtsManager};
