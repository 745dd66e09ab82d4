//! Text-to-Speech using the Baidu short-text REST API
//!
//! Text goes through two stages, each served by one long-lived worker:
//! the fetch worker turns queued text into audio clips over HTTP and the
//! playback worker plays those clips one by one on the output device.
//! The audio queue between them is bounded; when it is full fetching pauses
//! until a later `speak` (or a drained clip, if enabled) wakes it again.

pub mod cache;
pub mod decode;
pub mod manager;
pub mod player;
pub mod queue;
mod slot;
pub mod types;
pub mod worker;

pub use cache::AudioCache;
pub use manager::TtsManager;
pub use player::DevicePlayer;
pub use types::{AudioItem, SpeechEvent, SynthesisRequest, WorkerStatus};
pub use worker::BaiduSynthesizer;

use crate::config::AuthContext;
use crate::error::SpeakerError;

/// Turns one text request into one audio clip.
///
/// Called from the fetch worker only, never concurrently with itself.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        auth: &AuthContext,
        request: &SynthesisRequest,
    ) -> Result<AudioItem, SpeakerError>;
}

/// Plays one clip and returns once it has finished.
pub trait AudioSink: Send + Sync {
    fn play(&self, item: &AudioItem) -> Result<(), SpeakerError>;
}
