use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use super::decode::{decode, resample_linear};
use super::manager::Shared;
use super::types::{AudioItem, SpeechEvent};
use super::AudioSink;
use crate::error::SpeakerError;

/// How often `drain` looks at the output buffer
const DRAIN_POLL: Duration = Duration::from_millis(20);

/// Extra grace period for audio hardware after the buffer empties
const DRAIN_GRACE: Duration = Duration::from_millis(100);

/// One playback run: play clips in queue order until the queue is empty.
pub(crate) fn run_playback(shared: &Shared) {
    while !shared.is_stopping() {
        let Some(item) = shared.audio_queue.pop() else {
            return;
        };
        if shared.resume_fetch_on_drain && !shared.text_queue.is_empty() {
            shared.ensure_fetch_worker_running();
        }

        let id = item.id;
        shared.emit(SpeechEvent::PlaybackStarted { id });
        match shared.sink.play(&item) {
            Ok(()) => {
                tracing::debug!(id, "clip played");
                shared.emit(SpeechEvent::PlaybackFinished { id });
            }
            Err(e) => {
                tracing::warn!(id, error = %e, "playback failed, skipping clip");
                shared.emit(SpeechEvent::PlaybackFailed {
                    id,
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Plays clips on the default output device.
///
/// The `cpal` stream lives on its own thread and pulls mono samples from a
/// shared buffer; `play` pushes a decoded clip and waits for it to drain.
/// A stream that reported a fatal error is torn down and reopened by the
/// next `play`, so one device fault costs at most the clip in flight.
pub struct DevicePlayer {
    shared_buffer: Arc<Mutex<VecDeque<i16>>>,
    output: Mutex<Option<OutputThread>>,
}

impl DevicePlayer {
    pub fn open() -> Result<Self, SpeakerError> {
        let shared_buffer: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let output = OutputThread::spawn(shared_buffer.clone())?;
        tracing::info!(device_rate = output.device_rate, "audio output ready");

        Ok(Self {
            shared_buffer,
            output: Mutex::new(Some(output)),
        })
    }

    /// Device rate and health of a working stream, reopening a faulted one.
    fn healthy_output(&self) -> Result<(u32, Arc<StreamHealth>), SpeakerError> {
        let mut output = self.output.lock();
        let stream = reuse_or_reopen(
            &mut *output,
            |o| !o.health.is_faulted(),
            || {
                self.shared_buffer.lock().clear();
                tracing::warn!("reopening audio output after stream fault");
                OutputThread::spawn(self.shared_buffer.clone())
            },
        )?;
        Ok((stream.device_rate, stream.health.clone()))
    }

    fn drain(&self, health: &StreamHealth) -> Result<(), SpeakerError> {
        loop {
            if health.is_faulted() {
                self.shared_buffer.lock().clear();
                return Err(SpeakerError::Device("output stream faulted".to_string()));
            }
            if self.shared_buffer.lock().is_empty() {
                break;
            }
            std::thread::sleep(DRAIN_POLL);
        }
        std::thread::sleep(DRAIN_GRACE);
        Ok(())
    }
}

impl AudioSink for DevicePlayer {
    fn play(&self, item: &AudioItem) -> Result<(), SpeakerError> {
        let clip = decode(&item.data, item.format)?;
        let (device_rate, health) = self.healthy_output()?;
        let samples = resample_linear(&clip.samples, clip.sample_rate, device_rate);
        self.shared_buffer.lock().extend(samples);
        self.drain(&health)
    }
}

/// Keeps `slot` if it is still usable, otherwise replaces it with a fresh
/// one. A failed open leaves the slot empty so the next call tries again.
fn reuse_or_reopen<'a, T>(
    slot: &'a mut Option<T>,
    usable: impl Fn(&T) -> bool,
    open: impl FnOnce() -> Result<T, SpeakerError>,
) -> Result<&'a mut T, SpeakerError> {
    if !slot.as_ref().is_some_and(&usable) {
        // Old stream must be gone before the device is opened again
        *slot = None;
        *slot = Some(open()?);
    }
    slot.as_mut()
        .ok_or_else(|| SpeakerError::Device("audio output unavailable".to_string()))
}

/// Error state reported by the `cpal` error callback
#[derive(Default)]
struct StreamHealth {
    faulted: AtomicBool,
    underruns: AtomicU64,
}

impl StreamHealth {
    fn report(&self, err: &cpal::StreamError) {
        if is_fatal(err) {
            tracing::error!(error = %err, "audio output stream error");
            self.faulted.store(true, Ordering::SeqCst);
        } else {
            let underruns = self.underruns.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(error = %err, underruns, "audio output glitch");
        }
    }

    fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }
}

/// Underruns are glitches the backend recovers from; anything else means
/// the stream is gone.
fn is_fatal(err: &cpal::StreamError) -> bool {
    !matches!(err, cpal::StreamError::BufferUnderrun)
}

/// Thread owning one `cpal` stream (streams are not `Send`)
struct OutputThread {
    device_rate: u32,
    health: Arc<StreamHealth>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OutputThread {
    fn spawn(shared_buffer: Arc<Mutex<VecDeque<i16>>>) -> Result<Self, SpeakerError> {
        let health = Arc::new(StreamHealth::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread = {
            let health = health.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("tts-output".to_string())
                .spawn(move || {
                    let stream = match open_output_stream(shared_buffer, health) {
                        Ok((stream, rate)) => {
                            let _ = ready_tx.send(Ok(rate));
                            stream
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    while !shutdown.load(Ordering::Relaxed) {
                        std::thread::sleep(Duration::from_millis(50));
                    }
                    drop(stream);
                })?
        };

        let device_rate = ready_rx
            .recv()
            .map_err(|_| SpeakerError::Device("output thread exited".to_string()))??;

        Ok(Self {
            device_rate,
            health,
            shutdown,
            thread: Some(thread),
        })
    }
}

impl Drop for OutputThread {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Builds and starts the output stream, returning it with the device rate.
fn open_output_stream(
    shared_buffer: Arc<Mutex<VecDeque<i16>>>,
    health: Arc<StreamHealth>,
) -> Result<(cpal::Stream, u32), SpeakerError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| SpeakerError::Device("no audio output device found".to_string()))?;
    let supported = device
        .default_output_config()
        .map_err(|e| SpeakerError::Device(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let channels = (config.channels as usize).max(1);
    let sample_rate = config.sample_rate;

    let err_fn = move |err: cpal::StreamError| health.report(&err);

    // Mono source, same sample on every channel
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut buf = shared_buffer.lock();
                for frame in data.chunks_mut(channels) {
                    let sample = buf.pop_front().unwrap_or(0) as f32 / 32768.0;
                    frame.fill(sample);
                }
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                let mut buf = shared_buffer.lock();
                for frame in data.chunks_mut(channels) {
                    frame.fill(buf.pop_front().unwrap_or(0));
                }
            },
            err_fn,
            None,
        ),
        other => {
            return Err(SpeakerError::Device(format!(
                "unsupported output sample format {other:?}"
            )))
        }
    }
    .map_err(|e| SpeakerError::Device(e.to_string()))?;

    stream
        .play()
        .map_err(|e| SpeakerError::Device(e.to_string()))?;

    Ok((stream, sample_rate))
}
