use std::fmt;

use crate::config::{AudioFormat, SynthesisParams};

/// Baidu short-text synthesis endpoint
pub const SYNTHESIS_URL: &str = "https://tsn.baidu.com/text2audio";

/// Language tag (`lan`), the service only offers mixed zh/en
pub const LANGUAGE: &str = "zh";

/// Client type tag (`ctp`), 1 = web
pub const CLIENT_TYPE: &str = "1";

/// Text must be shorter than this many characters
pub const TEXT_CHAR_LIMIT: usize = 2048;

/// Largest clip body read from the service. The longest accepted text as
/// 16 kHz pcm/wav runs past ureq's 10 MiB default.
pub const MAX_CLIP_BYTES: u64 = 64 * 1024 * 1024;

/// Text waiting to be synthesized, with the voice params current at submit time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub id: u64,
    pub text: String,
    pub params: SynthesisParams,
}

/// One synthesized clip
#[derive(Clone, PartialEq, Eq)]
pub struct AudioItem {
    pub id: u64,
    pub text: String,
    pub format: AudioFormat,
    pub data: Vec<u8>,
}

impl fmt::Debug for AudioItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioItem")
            .field("id", &self.id)
            .field("text", &self.text)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Observable state of a worker slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    NotStarted,
    Running,
    Stopped,
}

/// Events emitted by the pipeline, in the order they happen per stage
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpeechEvent {
    Queued { id: u64, text: String },
    Fetched { id: u64, bytes: usize },
    FetchFailed { id: u64, reason: String },
    /// Audio queue full, fetching paused with `pending` texts left
    FetchDeferred { pending: usize },
    PlaybackStarted { id: u64 },
    PlaybackFinished { id: u64 },
    PlaybackFailed { id: u64, reason: String },
}
