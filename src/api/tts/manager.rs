use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::cache::AudioCache;
use super::player::run_playback;
use super::queue::{AudioQueue, TextQueue};
use super::slot::WorkerSlot;
use super::types::{SpeechEvent, SynthesisRequest, WorkerStatus, TEXT_CHAR_LIMIT};
use super::worker::run_fetch;
use super::{AudioSink, SpeechSynthesizer};
use crate::api::token::CredentialExchange;
use crate::config::{Credentials, PipelineConfig, SessionConfig, SharedSession, SynthesisParams};
use crate::error::SpeakerError;

const IDLE_POLL: Duration = Duration::from_millis(10);

/// State shared by the controller and both worker threads
pub(crate) struct Shared {
    pub session: SharedSession,
    pub text_queue: TextQueue,
    pub audio_queue: AudioQueue,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub sink: Arc<dyn AudioSink>,
    pub cache: Option<AudioCache>,
    pub resume_fetch_on_drain: bool,
    fetch_slot: WorkerSlot,
    playback_slot: WorkerSlot,
    events: mpsc::Sender<SpeechEvent>,
    next_id: AtomicU64,
    stopping: AtomicBool,
}

impl Shared {
    pub fn emit(&self, event: SpeechEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    pub fn ensure_fetch_worker_running(&self) -> bool {
        self.fetch_slot.ensure_running()
    }

    /// Workers check this between items so shutdown does not wait for a full drain
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    pub fn ensure_playback_worker_running(&self) -> bool {
        self.playback_slot.ensure_running()
    }
}

/// Owns the session, both queues and the two worker threads.
///
/// `speak` only enqueues; the fetch worker turns text into clips and the
/// playback worker plays them one after another in submission order.
pub struct TtsManager {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl TtsManager {
    /// Spawn the worker threads (parked until there is work) and return the
    /// manager with its event stream.
    pub fn start(
        config: PipelineConfig,
        session: SessionConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> Result<(Self, mpsc::Receiver<SpeechEvent>), SpeakerError> {
        session.params.validate()?;
        let (events, rx) = mpsc::channel();

        let shared = Arc::new(Shared {
            session: session.into_shared(),
            text_queue: TextQueue::new(),
            audio_queue: AudioQueue::with_capacity(config.audio_queue_capacity),
            synthesizer,
            sink,
            cache: config.cache_dir.map(AudioCache::new),
            resume_fetch_on_drain: config.resume_fetch_on_drain,
            fetch_slot: WorkerSlot::new("fetch"),
            playback_slot: WorkerSlot::new("playback"),
            events,
            next_id: AtomicU64::new(1),
            stopping: AtomicBool::new(false),
        });

        let mut manager = Self {
            shared,
            threads: Vec::with_capacity(2),
        };

        let shared = manager.shared.clone();
        manager.threads.push(
            std::thread::Builder::new()
                .name("tts-fetch".to_string())
                .spawn(move || shared.fetch_slot.serve(|| run_fetch(&shared)))?,
        );

        let shared = manager.shared.clone();
        manager.threads.push(
            std::thread::Builder::new()
                .name("tts-playback".to_string())
                .spawn(move || shared.playback_slot.serve(|| run_playback(&shared)))?,
        );

        tracing::debug!(
            capacity = manager.shared.audio_queue.capacity(),
            resume_fetch_on_drain = manager.shared.resume_fetch_on_drain,
            "tts pipeline started"
        );
        Ok((manager, rx))
    }

    /// Exchange credentials for an access token and store it in the session.
    /// On failure the session is left without a token.
    pub fn initialize(
        &self,
        exchange: &dyn CredentialExchange,
        api_key: &str,
        secret_key: &str,
    ) -> Result<(), SpeakerError> {
        let credentials = Credentials::new(api_key, secret_key)?;
        self.shared.session.write().credentials = Some(credentials.clone());

        match exchange.exchange(&credentials) {
            Ok(token) => {
                tracing::info!(expires_at = %token.expires_at, "session initialized");
                self.shared.session.write().access_token = Some(token);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "credential exchange failed");
                self.shared.session.write().access_token = None;
                Err(e)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.shared.session.read().is_initialized()
    }

    /// Voice params for texts submitted from now on.
    pub fn update_params(&self, params: SynthesisParams) -> Result<(), SpeakerError> {
        params.validate()?;
        self.shared.session.write().params = params;
        Ok(())
    }

    pub fn session(&self) -> SharedSession {
        self.shared.session.clone()
    }

    /// Queue text for synthesis. Returns the request id without waiting for
    /// the network or the speaker.
    pub fn speak(&self, text: &str) -> Result<u64, SpeakerError> {
        if text.trim().is_empty() {
            return Err(SpeakerError::EmptyText);
        }
        let chars = text.chars().count();
        if chars >= TEXT_CHAR_LIMIT {
            return Err(SpeakerError::TextTooLong {
                chars,
                limit: TEXT_CHAR_LIMIT,
            });
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let params = self.shared.session.read().params.clone();
        self.shared.text_queue.push(SynthesisRequest {
            id,
            text: text.to_string(),
            params,
        });
        tracing::debug!(id, chars, "text queued");
        self.shared.emit(SpeechEvent::Queued {
            id,
            text: text.to_string(),
        });

        self.ensure_fetch_worker_running();
        Ok(id)
    }

    /// Start a fetch run unless one is in progress.
    pub fn ensure_fetch_worker_running(&self) -> bool {
        self.shared.ensure_fetch_worker_running()
    }

    /// Start a playback run unless one is in progress.
    pub fn ensure_playback_worker_running(&self) -> bool {
        self.shared.ensure_playback_worker_running()
    }

    pub fn fetch_status(&self) -> WorkerStatus {
        self.shared.fetch_slot.status()
    }

    pub fn playback_status(&self) -> WorkerStatus {
        self.shared.playback_slot.status()
    }

    pub fn fetch_runs(&self) -> u64 {
        self.shared.fetch_slot.runs()
    }

    pub fn playback_runs(&self) -> u64 {
        self.shared.playback_slot.runs()
    }

    pub fn pending_text(&self) -> usize {
        self.shared.text_queue.len()
    }

    pub fn pending_audio(&self) -> usize {
        self.shared.audio_queue.len()
    }

    /// Neither worker is running and no clip is waiting. Text may still be
    /// pending if fetching paused on a full audio queue.
    pub fn is_idle(&self) -> bool {
        let runs = (self.fetch_runs(), self.playback_runs());
        let quiet = self.fetch_status() != WorkerStatus::Running
            && self.playback_status() != WorkerStatus::Running
            && self.shared.audio_queue.is_empty();
        // A worker can wake the other between the reads above
        quiet
            && self.fetch_status() != WorkerStatus::Running
            && runs == (self.fetch_runs(), self.playback_runs())
    }

    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_idle() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    /// Stop both worker threads after their current item and join them.
    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.fetch_slot.shutdown();
        self.shared.playback_slot.shutdown();
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                tracing::error!("tts worker thread panicked during shutdown");
            }
        }
        tracing::debug!("tts pipeline stopped");
    }
}

impl Drop for TtsManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}
