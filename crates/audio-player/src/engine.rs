//! Public engine API: start, pause, resume and stop voices on one output stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use thiserror::Error;

use crate::config::PlaybackConfig;
use crate::decode;
use crate::device;
use crate::mixer::{self, MixerShared, Voice};
use crate::resample::{self, ResampleConfig};
use crate::source::{OpenedSource, VoiceRequest, format_hint};

/// Why a voice could not be started. The engine holds no state for a failed start.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
}

/// Opaque reference to a started voice.
///
/// Not `Clone`: [`Engine::stop`] consumes it, so a voice is released at most once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    key: u64,
}

impl VoiceHandle {
    pub fn key(&self) -> u64 {
        self.key
    }
}

/// Receiving side of a voice's end-of-stream notification.
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<()>,
}

/// Sending side of a [`Completion`]. Dropping it without `notify` means "cancelled".
#[derive(Debug)]
pub struct CompletionSignal {
    tx: Sender<()>,
}

impl Completion {
    pub fn pair() -> (CompletionSignal, Completion) {
        let (tx, rx) = crossbeam_channel::bounded(1);
        (CompletionSignal { tx }, Completion { rx })
    }

    /// Block until the voice ends.
    ///
    /// Returns `true` on natural end-of-stream, `false` if the voice was cancelled.
    pub fn wait(self) -> bool {
        self.rx.recv().is_ok()
    }
}

impl CompletionSignal {
    pub fn notify(self) {
        let _ = self.tx.try_send(());
    }
}

/// Format of the shared output stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// The playback engine: one output stream mixing any number of voices.
///
/// The CPAL stream lives on a dedicated thread for the lifetime of the engine;
/// dropping the engine stops it.
pub struct Engine {
    shared: Arc<MixerShared>,
    output: OutputFormat,
    config: PlaybackConfig,
    next_key: AtomicU64,
    _shutdown: Sender<()>,
}

impl Engine {
    /// Open the output device and start the (initially silent) mixer stream.
    pub fn start(config: PlaybackConfig) -> Result<Self> {
        let shared = Arc::new(MixerShared::default());
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<OutputFormat>>(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let shared_for_thread = shared.clone();
        let config_for_thread = config.clone();
        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match open_output(&config_for_thread, shared_for_thread) {
                Ok((stream, format)) => {
                    let _ = ready_tx.send(Ok(format));
                    // Blocks until the engine (and its sender) is dropped.
                    let _ = shutdown_rx.recv();
                    drop(stream);
                    tracing::info!("audio output closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .context("spawn audio output thread")?;

        let output = ready_rx
            .recv()
            .context("audio output thread exited before reporting")??;

        Ok(Self {
            shared,
            output,
            config,
            next_key: AtomicU64::new(1),
            _shutdown: shutdown_tx,
        })
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output
    }

    /// Decode `request` and add it to the mix. Returns once the voice is live.
    pub fn play(&self, request: &VoiceRequest<'_>) -> Result<(VoiceHandle, Completion), StartError> {
        let hint = format_hint(request.format).ok_or_else(|| {
            StartError::UnsupportedFormat(format!("unknown format tag {:?}", request.format))
        })?;
        let source = OpenedSource::open(request.source)?;

        let (src_spec, srcq) = decode::start_voice_decode(
            source,
            hint,
            self.config.buffer_seconds,
            request.looping,
        )?;

        let mut stages = vec![srcq.clone()];
        let output_q = if src_spec.rate == self.output.sample_rate {
            srcq
        } else {
            let resampled = resample::start_resampler(
                srcq.clone(),
                src_spec,
                self.output.sample_rate,
                ResampleConfig {
                    chunk_frames: self.config.chunk_frames,
                    buffer_seconds: self.config.buffer_seconds,
                },
            );
            match resampled {
                Ok(q) => {
                    stages.push(q.clone());
                    q
                }
                Err(e) => {
                    srcq.abort();
                    return Err(StartError::UnsupportedFormat(format!("{e:#}")));
                }
            }
        };

        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let (signal, completion) = Completion::pair();
        let voice = Voice::new(key, output_q, stages, request.gain(), signal);
        self.shared.voices().push(voice);

        tracing::debug!(
            voice = key,
            source_rate_hz = src_spec.rate,
            output_rate_hz = self.output.sample_rate,
            looping = request.looping,
            "voice started"
        );
        Ok((VoiceHandle { key }, completion))
    }

    /// Silence a voice without discarding its position.
    ///
    /// Returns `false` if the voice already ended.
    pub fn pause(&self, handle: &VoiceHandle) -> bool {
        self.set_paused(handle, true)
    }

    pub fn resume(&self, handle: &VoiceHandle) -> bool {
        self.set_paused(handle, false)
    }

    /// Remove a voice from the mix and tear down its pipeline. Its completion never fires.
    ///
    /// Returns `false` if the voice had already ended on its own.
    pub fn stop(&self, handle: VoiceHandle) -> bool {
        let removed = {
            let mut voices = self.shared.voices();
            voices
                .iter()
                .position(|v| v.key == handle.key)
                .map(|i| voices.swap_remove(i))
        };
        match removed {
            Some(voice) => {
                voice.cancel();
                true
            }
            None => false,
        }
    }

    fn set_paused(&self, handle: &VoiceHandle, paused: bool) -> bool {
        let mut voices = self.shared.voices();
        match voices.iter_mut().find(|v| v.key == handle.key) {
            Some(voice) => {
                voice.paused = paused;
                true
            }
            None => false,
        }
    }
}

fn open_output(
    config: &PlaybackConfig,
    shared: Arc<MixerShared>,
) -> Result<(cpal::Stream, OutputFormat)> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, config.device.as_deref())?;
    let supported = device::pick_output_config(&device, config.preferred_rate)?;
    let mut stream_config: cpal::StreamConfig = supported.clone().into();
    if let Some(buf) = device::pick_buffer_size(&supported) {
        stream_config.buffer_size = buf;
    }

    tracing::info!(device = %device.description()?, "output device");
    tracing::info!(
        output_rate_hz = stream_config.sample_rate,
        channels = stream_config.channels,
        buffer_size = ?stream_config.buffer_size,
        "mixer output config"
    );

    let stream = mixer::build_mixer_stream(
        &device,
        &stream_config,
        supported.sample_format(),
        shared,
        config.refill_max_frames,
    )?;
    stream.play()?;

    Ok((
        stream,
        OutputFormat {
            sample_rate: stream_config.sample_rate,
            channels: stream_config.channels,
        },
    ))
}
