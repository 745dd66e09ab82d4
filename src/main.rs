use anyhow::Context;
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use tts_speaker::config::{AudioFormat, Voice};
use tts_speaker::{
    BaiduOAuth, BaiduSynthesizer, DevicePlayer, Settings, SpeechEvent, TtsManager,
};

/// How long to wait for the pipeline to finish after the last text
const IDLE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Parser, Debug)]
#[command(name = "tts-speaker")]
#[command(about = "Speak text through the Baidu TTS service")]
#[command(version)]
struct Cli {
    /// Text to speak; reads one text per stdin line when omitted
    text: Vec<String>,

    #[arg(long, env = "BAIDU_TTS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "BAIDU_TTS_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Client id sent as `cuid`
    #[arg(long)]
    client_id: Option<String>,

    /// female, male, du_xiao_yao or du_ya_ya
    #[arg(long)]
    voice: Option<Voice>,

    /// 0-15
    #[arg(long)]
    speed: Option<u8>,

    /// 0-15
    #[arg(long)]
    pitch: Option<u8>,

    /// 0-15
    #[arg(long)]
    volume: Option<u8>,

    /// mp3, pcm16k, pcm8k or wav
    #[arg(long)]
    format: Option<AudioFormat>,

    /// Clips buffered ahead of playback before fetching pauses
    #[arg(long)]
    capacity: Option<usize>,

    /// Synthesis request timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep a copy of every fetched clip in the cache directory
    #[arg(long)]
    cache: bool,

    /// Resume fetching as soon as playback frees queue space
    #[arg(long)]
    resume_on_drain: bool,

    /// Settings file (default: <config_dir>/tts-speaker/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective settings back to the settings file and exit
    #[arg(long)]
    save_config: bool,
}

impl Cli {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(key) = &self.api_key {
            settings.api_key = key.clone();
        }
        if let Some(key) = &self.secret_key {
            settings.secret_key = key.clone();
        }
        if let Some(id) = &self.client_id {
            settings.client_id = id.clone();
        }
        if let Some(voice) = self.voice {
            settings.params.voice = voice;
        }
        if let Some(speed) = self.speed {
            settings.params.speed = speed;
        }
        if let Some(pitch) = self.pitch {
            settings.params.pitch = pitch;
        }
        if let Some(volume) = self.volume {
            settings.params.volume = volume;
        }
        if let Some(format) = self.format {
            settings.params.format = format;
        }
        if let Some(capacity) = self.capacity {
            settings.audio_queue_capacity = capacity;
        }
        if let Some(secs) = self.timeout_secs {
            settings.fetch_timeout_secs = secs;
        }
        settings.cache_enabled |= self.cache;
        settings.resume_fetch_on_drain |= self.resume_on_drain;
    }
}

fn log_events(events: mpsc::Receiver<SpeechEvent>) {
    for event in events {
        match event {
            SpeechEvent::Queued { id, text } => tracing::info!(id, %text, "queued"),
            SpeechEvent::PlaybackStarted { id } => tracing::info!(id, "speaking"),
            SpeechEvent::FetchFailed { id, reason } => {
                tracing::error!(id, %reason, "could not synthesize")
            }
            SpeechEvent::PlaybackFailed { id, reason } => {
                tracing::error!(id, %reason, "could not play")
            }
            SpeechEvent::FetchDeferred { pending } => {
                tracing::info!(pending, "playback is behind, waiting")
            }
            other => tracing::debug!(?other, "pipeline event"),
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Settings::default_path);
    let mut settings = Settings::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    cli.apply_to(&mut settings);

    if cli.save_config {
        settings
            .save_to(&config_path)
            .with_context(|| format!("saving {}", config_path.display()))?;
        tracing::info!(path = %config_path.display(), "settings saved");
        return Ok(());
    }

    let session = settings.session_config()?;
    let pipeline = settings.pipeline_config();
    let timeout = pipeline.fetch_timeout;

    let sink = Arc::new(DevicePlayer::open().context("opening audio output")?);
    let synthesizer = Arc::new(BaiduSynthesizer::new(timeout));
    let (mut manager, events) = TtsManager::start(pipeline, session, synthesizer, sink)?;
    let logger = std::thread::spawn(move || log_events(events));

    manager
        .initialize(&BaiduOAuth::new(), &settings.api_key, &settings.secret_key)
        .context("exchanging credentials")?;

    if cli.text.is_empty() {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Err(e) = manager.speak(&line) {
                tracing::warn!(error = %e, "skipping line");
            }
        }
    } else {
        for text in &cli.text {
            if let Err(e) = manager.speak(text) {
                tracing::warn!(error = %e, "skipping text");
            }
        }
    }

    // Text stranded behind a full audio queue needs another wake once playback catches up
    while manager.pending_text() > 0 || !manager.is_idle() {
        if !manager.wait_until_idle(IDLE_TIMEOUT) {
            anyhow::bail!("timed out waiting for playback to finish");
        }
        if manager.pending_text() > 0 {
            manager.ensure_fetch_worker_running();
        }
    }

    manager.shutdown();
    drop(manager);
    let _ = logger.join();
    Ok(())
}
