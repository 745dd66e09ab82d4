//! End-to-end behavior of the fetch/playback pipeline with mock network and
//! audio backends.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tts_speaker::config::{AccessToken, AuthContext, Credentials};
use tts_speaker::{
    AudioItem, AudioSink, CredentialExchange, PipelineConfig, SessionConfig, SpeakerError,
    SpeechEvent, SpeechSynthesizer, SynthesisParams, SynthesisRequest, TtsManager, WorkerStatus,
};

const WAIT: Duration = Duration::from_secs(5);

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Tracks how many callers are inside a section at once
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockSynthesizer {
    calls: Mutex<Vec<SynthesisRequest>>,
    failing: HashSet<String>,
    /// Per-character latency
    delay_per_char: Duration,
    concurrency: Concurrency,
}

impl MockSynthesizer {
    fn failing_on(texts: &[&str]) -> Self {
        Self {
            failing: texts.iter().map(|t| t.to_string()).collect(),
            ..Self::default()
        }
    }

    fn with_delay_per_char(delay: Duration) -> Self {
        Self {
            delay_per_char: delay,
            ..Self::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl SpeechSynthesizer for MockSynthesizer {
    fn synthesize(
        &self,
        auth: &AuthContext,
        request: &SynthesisRequest,
    ) -> Result<AudioItem, SpeakerError> {
        assert_eq!(auth.access_token, "test-token");
        self.concurrency.enter();
        self.calls.lock().push(request.clone());
        std::thread::sleep(self.delay_per_char * request.text.chars().count() as u32);
        self.concurrency.leave();

        if self.failing.contains(&request.text) {
            return Err(SpeakerError::Status(500));
        }
        Ok(AudioItem {
            id: request.id,
            text: request.text.clone(),
            format: request.params.format,
            data: request.text.as_bytes().to_vec(),
        })
    }
}

/// Sink that records what it plays and can hold playback until released
struct MockSink {
    started: Mutex<Vec<String>>,
    played: Mutex<Vec<String>>,
    failing: HashSet<String>,
    open: Mutex<bool>,
    gate: Condvar,
    delay: Duration,
    concurrency: Concurrency,
}

impl Default for MockSink {
    fn default() -> Self {
        Self {
            started: Mutex::new(Vec::new()),
            played: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            open: Mutex::new(true),
            gate: Condvar::new(),
            delay: Duration::ZERO,
            concurrency: Concurrency::default(),
        }
    }
}

impl MockSink {
    fn gated() -> Self {
        Self {
            open: Mutex::new(false),
            ..Self::default()
        }
    }

    fn release(&self) {
        *self.open.lock() = true;
        self.gate.notify_all();
    }

    fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

impl AudioSink for MockSink {
    fn play(&self, item: &AudioItem) -> Result<(), SpeakerError> {
        self.concurrency.enter();
        self.started.lock().push(item.text.clone());
        {
            let mut open = self.open.lock();
            while !*open {
                self.gate.wait(&mut open);
            }
        }
        std::thread::sleep(self.delay);
        self.concurrency.leave();

        if self.failing.contains(&item.text) {
            return Err(SpeakerError::Decode("bad clip".to_string()));
        }
        self.played.lock().push(item.text.clone());
        Ok(())
    }
}

fn session() -> SessionConfig {
    let mut session = SessionConfig::new("test-client", SynthesisParams::default());
    session.access_token = Some(AccessToken::from_expires_in("test-token", 3600));
    session
}

fn pipeline(capacity: usize, resume: bool) -> PipelineConfig {
    PipelineConfig {
        audio_queue_capacity: capacity,
        resume_fetch_on_drain: resume,
        ..PipelineConfig::default()
    }
}

fn start(
    config: PipelineConfig,
    synth: &Arc<MockSynthesizer>,
    sink: &Arc<MockSink>,
) -> (TtsManager, mpsc::Receiver<SpeechEvent>) {
    TtsManager::start(config, session(), synth.clone(), sink.clone()).unwrap()
}

fn texts(items: &[&str]) -> Vec<String> {
    items.iter().map(|t| t.to_string()).collect()
}

#[test]
fn hello_world_plays_in_order_despite_fetch_latency() {
    let synth = Arc::new(MockSynthesizer::with_delay_per_char(Duration::from_millis(10)));
    let sink = Arc::new(MockSink::default());
    let (manager, events) = start(PipelineConfig::default(), &synth, &sink);

    let hello = manager.speak("hello").unwrap();
    let world = manager.speak("world").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    assert_eq!(sink.played(), texts(&["hello", "world"]));
    let finished: Vec<u64> = events
        .try_iter()
        .filter_map(|e| match e {
            SpeechEvent::PlaybackFinished { id } => Some(id),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![hello, world]);
}

#[test]
fn short_text_after_long_text_waits_its_turn() {
    let synth = Arc::new(MockSynthesizer::with_delay_per_char(Duration::from_millis(5)));
    let sink = Arc::new(MockSink::default());
    let (manager, _events) = start(PipelineConfig::default(), &synth, &sink);

    let long = "a much longer opening sentence that takes a while to synthesize";
    manager.speak(long).unwrap();
    manager.speak("hi").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    assert_eq!(sink.played(), texts(&[long, "hi"]));
    let fetched: Vec<String> = synth.calls.lock().iter().map(|r| r.text.clone()).collect();
    assert_eq!(fetched, texts(&[long, "hi"]));
}

#[test]
fn many_texts_play_in_submission_order() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, _events) = start(pipeline(32, false), &synth, &sink);

    let submitted: Vec<String> = (0..15).map(|i| format!("sentence {i}")).collect();
    for text in &submitted {
        manager.speak(text).unwrap();
    }
    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(sink.played(), submitted);
}

#[test]
fn at_most_one_worker_per_stage_under_concurrent_submits() {
    let synth = Arc::new(MockSynthesizer::with_delay_per_char(Duration::from_micros(200)));
    let sink = Arc::new(MockSink {
        delay: Duration::from_millis(2),
        ..MockSink::default()
    });
    let (manager, _events) = start(pipeline(64, false), &synth, &sink);

    std::thread::scope(|scope| {
        for t in 0..4 {
            let manager = &manager;
            scope.spawn(move || {
                for i in 0..5 {
                    manager.speak(&format!("thread {t} text {i}")).unwrap();
                }
            });
        }
    });

    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(synth.call_count(), 20);
    assert_eq!(sink.played().len(), 20);
    assert_eq!(synth.concurrency.max(), 1);
    assert_eq!(sink.concurrency.max(), 1);

    // Each submitter's own texts keep their relative order
    let played = sink.played();
    for t in 0..4 {
        let prefix = format!("thread {t} ");
        let mine: Vec<&String> = played.iter().filter(|p| p.starts_with(&prefix)).collect();
        let expected: Vec<String> = (0..5).map(|i| format!("thread {t} text {i}")).collect();
        assert_eq!(mine, expected.iter().collect::<Vec<_>>());
    }
}

#[test]
fn full_audio_queue_pauses_fetching_until_next_submit() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::gated());
    let (manager, events) = start(pipeline(2, false), &synth, &sink);

    manager.speak("t1").unwrap();
    assert!(wait_for(|| sink.started() == texts(&["t1"])));
    assert!(wait_for(|| manager.fetch_status() == WorkerStatus::Stopped));

    for text in ["t2", "t3", "t4", "t5"] {
        manager.speak(text).unwrap();
    }
    assert!(wait_for(|| manager.fetch_status() == WorkerStatus::Stopped
        && manager.pending_text() == 2));
    assert_eq!(synth.call_count(), 3);
    assert_eq!(manager.pending_audio(), 2);

    // Still full: another submit starts a run that fetches nothing
    manager.speak("t6").unwrap();
    assert!(wait_for(|| manager.fetch_status() == WorkerStatus::Stopped));
    assert_eq!(synth.call_count(), 3);
    assert_eq!(manager.pending_text(), 3);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, SpeechEvent::FetchDeferred { .. })));

    // Playback drains the queue but nothing wakes the fetch worker
    sink.release();
    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(sink.played(), texts(&["t1", "t2", "t3"]));
    assert_eq!(manager.pending_text(), 3);
    assert_eq!(synth.call_count(), 3);

    // The next submit resumes fetching
    manager.speak("t7").unwrap();
    assert!(manager.wait_until_idle(WAIT));
    assert!(synth.call_count() > 3);

    let mut wakes = 0;
    while manager.pending_text() > 0 && wakes < 10 {
        manager.ensure_fetch_worker_running();
        assert!(manager.wait_until_idle(WAIT));
        wakes += 1;
    }
    assert_eq!(
        sink.played(),
        texts(&["t1", "t2", "t3", "t4", "t5", "t6", "t7"])
    );
}

#[test]
fn resume_on_drain_refills_without_another_submit() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::gated());
    let (manager, _events) = start(pipeline(2, true), &synth, &sink);

    manager.speak("t1").unwrap();
    assert!(wait_for(|| sink.started() == texts(&["t1"])));

    for text in ["t2", "t3", "t4", "t5", "t6"] {
        manager.speak(text).unwrap();
    }
    assert!(wait_for(|| manager.fetch_status() == WorkerStatus::Stopped
        && manager.pending_text() == 3));
    assert_eq!(synth.call_count(), 3);

    sink.release();
    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(manager.pending_text(), 0);
    assert_eq!(
        sink.played(),
        texts(&["t1", "t2", "t3", "t4", "t5", "t6"])
    );
}

#[test]
fn idle_is_not_reported_while_playback_hands_work_back_to_fetch() {
    // Capacity 1 makes every dequeue wake the fetch worker
    for round in 0..10 {
        let synth = Arc::new(MockSynthesizer::default());
        let sink = Arc::new(MockSink {
            delay: Duration::from_micros(300),
            ..MockSink::default()
        });
        let (manager, _events) = start(pipeline(1, true), &synth, &sink);

        let submitted: Vec<String> = (0..12).map(|i| format!("round {round} text {i}")).collect();
        for text in &submitted {
            manager.speak(text).unwrap();
        }
        assert!(manager.wait_until_idle(WAIT));
        assert_eq!(manager.pending_text(), 0, "round {round}");
        assert_eq!(manager.pending_audio(), 0, "round {round}");
        assert_eq!(sink.played(), submitted, "round {round}");
    }
}

#[test]
fn failed_fetch_drops_only_that_text() {
    let synth = Arc::new(MockSynthesizer::failing_on(&["bad"]));
    let sink = Arc::new(MockSink::default());
    let (manager, events) = start(PipelineConfig::default(), &synth, &sink);

    manager.speak("first").unwrap();
    let bad = manager.speak("bad").unwrap();
    manager.speak("last").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    assert_eq!(sink.played(), texts(&["first", "last"]));
    assert!(events.try_iter().any(|e| matches!(
        e,
        SpeechEvent::FetchFailed { id, .. } if id == bad
    )));
}

#[test]
fn failed_playback_skips_only_that_clip() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink {
        failing: ["broken".to_string()].into_iter().collect(),
        ..MockSink::default()
    });
    let (manager, events) = start(PipelineConfig::default(), &synth, &sink);

    manager.speak("before").unwrap();
    let broken = manager.speak("broken").unwrap();
    manager.speak("after").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    assert_eq!(sink.played(), texts(&["before", "after"]));
    assert!(events.try_iter().any(|e| matches!(
        e,
        SpeechEvent::PlaybackFailed { id, .. } if id == broken
    )));
}

#[test]
fn stopped_workers_restart_on_new_work() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, _events) = start(PipelineConfig::default(), &synth, &sink);

    assert_eq!(manager.fetch_status(), WorkerStatus::NotStarted);
    assert_eq!(manager.playback_status(), WorkerStatus::NotStarted);

    manager.speak("one").unwrap();
    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(manager.fetch_status(), WorkerStatus::Stopped);
    assert!(wait_for(|| manager.playback_status() == WorkerStatus::Stopped));
    assert_eq!(manager.fetch_runs(), 1);
    assert_eq!(manager.playback_runs(), 1);

    manager.speak("two").unwrap();
    assert!(manager.wait_until_idle(WAIT));
    assert_eq!(manager.fetch_runs(), 2);
    assert_eq!(manager.playback_runs(), 2);
    assert_eq!(sink.played(), texts(&["one", "two"]));
}

#[test]
fn empty_and_oversized_text_is_rejected_without_queueing() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, events) = start(PipelineConfig::default(), &synth, &sink);

    assert!(matches!(manager.speak(""), Err(SpeakerError::EmptyText)));
    assert!(matches!(manager.speak(" \n\t"), Err(SpeakerError::EmptyText)));
    assert!(matches!(
        manager.speak(&"字".repeat(2048)),
        Err(SpeakerError::TextTooLong { chars: 2048, .. })
    ));

    assert_eq!(manager.pending_text(), 0);
    assert_eq!(manager.fetch_status(), WorkerStatus::NotStarted);
    assert_eq!(manager.fetch_runs(), 0);
    assert!(events.try_recv().is_err());
    assert!(manager.speak(&"字".repeat(2047)).is_ok());
}

#[test]
fn params_are_captured_at_submit_time() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, _events) = start(PipelineConfig::default(), &synth, &sink);

    manager.speak("default voice").unwrap();
    manager
        .update_params(SynthesisParams {
            speed: 9,
            ..SynthesisParams::default()
        })
        .unwrap();
    manager.speak("faster voice").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    let calls = synth.calls.lock();
    assert_eq!(calls[0].params.speed, 5);
    assert_eq!(calls[1].params.speed, 9);

    assert!(matches!(
        manager.update_params(SynthesisParams {
            volume: 20,
            ..SynthesisParams::default()
        }),
        Err(SpeakerError::InvalidParam { name: "volume", .. })
    ));
}

#[test]
fn fetch_without_token_fails_per_item() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, events) = TtsManager::start(
        PipelineConfig::default(),
        SessionConfig::default(),
        synth.clone(),
        sink.clone(),
    )
    .unwrap();

    assert!(!manager.is_initialized());
    let id = manager.speak("hello").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    assert_eq!(synth.call_count(), 0);
    assert!(sink.played().is_empty());
    assert!(events.try_iter().any(|e| matches!(
        e,
        SpeechEvent::FetchFailed { id: failed, .. } if failed == id
    )));
}

struct MockExchange {
    result: fn() -> Result<AccessToken, SpeakerError>,
    calls: AtomicUsize,
}

impl CredentialExchange for MockExchange {
    fn exchange(&self, credentials: &Credentials) -> Result<AccessToken, SpeakerError> {
        assert_eq!(credentials.api_key, "key");
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.result)()
    }
}

#[test]
fn initialize_stores_token_or_leaves_session_uninitialized() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (manager, _events) = TtsManager::start(
        PipelineConfig::default(),
        SessionConfig::default(),
        synth,
        sink,
    )
    .unwrap();

    let rejecting = MockExchange {
        result: || {
            Err(SpeakerError::TokenRejected {
                error: "invalid_client".to_string(),
                description: "unknown client id".to_string(),
            })
        },
        calls: AtomicUsize::new(0),
    };
    assert!(manager.initialize(&rejecting, "key", "secret").is_err());
    assert!(!manager.is_initialized());

    assert!(matches!(
        manager.initialize(&rejecting, "key", ""),
        Err(SpeakerError::MissingCredentials)
    ));
    assert_eq!(rejecting.calls.load(Ordering::SeqCst), 1);

    let granting = MockExchange {
        result: || Ok(AccessToken::from_expires_in("fresh", 2_592_000)),
        calls: AtomicUsize::new(0),
    };
    manager.initialize(&granting, "key", "secret").unwrap();
    assert!(manager.is_initialized());
    let session = manager.session();
    let session = session.read();
    assert_eq!(session.access_token.as_ref().unwrap().token, "fresh");
    assert_eq!(session.credentials.as_ref().unwrap().secret_key, "secret");
}

#[test]
fn fetched_clips_are_cached_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let config = PipelineConfig {
        cache_dir: Some(dir.path().to_path_buf()),
        ..PipelineConfig::default()
    };
    let (manager, _events) = start(config, &synth, &sink);

    manager.speak("cache me").unwrap();
    assert!(manager.wait_until_idle(WAIT));

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"cache me");
}

#[test]
fn shutdown_is_idempotent_and_stops_workers() {
    let synth = Arc::new(MockSynthesizer::default());
    let sink = Arc::new(MockSink::default());
    let (mut manager, _events) = start(PipelineConfig::default(), &synth, &sink);

    manager.speak("bye").unwrap();
    assert!(manager.wait_until_idle(WAIT));
    manager.shutdown();
    manager.shutdown();

    assert!(!manager.ensure_fetch_worker_running());
    assert_eq!(manager.fetch_status(), WorkerStatus::Stopped);
    assert_eq!(manager.playback_status(), WorkerStatus::Stopped);
    assert_eq!(sink.played(), texts(&["bye"]));
}
