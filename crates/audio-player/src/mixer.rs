//! Mix stage: one CPAL output stream shared by every voice.
//!
//! The callback:
//! - locks the voice list (the output lock; pause/resume/stop take the same lock)
//! - refills each live voice's local buffer from its queue without blocking
//! - maps voice channels to device channels, applies gain, and sums
//! - retires voices whose queues are drained and fires their completion
//! - converts the clamped `f32` mix to the device sample format

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::engine::CompletionSignal;
use crate::queue::{PopStrategy, SharedAudio};

/// One playing (or paused) voice as seen by the output callback.
pub(crate) struct Voice {
    pub(crate) key: u64,
    /// Queue at the mixer rate; drained by the callback.
    output: Arc<SharedAudio>,
    /// Every queue in this voice's pipeline, closed on stop.
    stages: Vec<Arc<SharedAudio>>,
    gain: f32,
    pub(crate) paused: bool,
    buf: VoiceBuffer,
    done: Option<CompletionSignal>,
}

/// Local slice of interleaved samples fetched from the voice queue.
struct VoiceBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl Voice {
    pub(crate) fn new(
        key: u64,
        output: Arc<SharedAudio>,
        stages: Vec<Arc<SharedAudio>>,
        gain: f32,
        done: CompletionSignal,
    ) -> Self {
        let src_channels = output.channels();
        Self {
            key,
            output,
            stages,
            gain,
            paused: false,
            buf: VoiceBuffer {
                pos: 0,
                src_channels,
                src: Vec::new(),
            },
            done: Some(done),
        }
    }

    /// Add up to `mix.len() / dst_channels` frames of this voice into `mix`.
    fn mix_into(&mut self, mix: &mut [f32], dst_channels: usize, refill_max_frames: usize) {
        let frames = mix.len() / dst_channels;
        for frame in 0..frames {
            if self.buf.pos >= self.buf.src.len() {
                self.buf.pos = 0;
                match self.output.pop(PopStrategy::NonBlocking {
                    max_frames: refill_max_frames,
                }) {
                    Some(v) => self.buf.src = v,
                    None => {
                        self.buf.src.clear();
                        return;
                    }
                }
            }
            for ch in 0..dst_channels {
                mix[frame * dst_channels + ch] +=
                    self.gain * next_sample_mapped(&mut self.buf, dst_channels, ch);
            }
        }
    }

    /// Upstream finished and everything buffered has been played.
    fn is_finished(&self) -> bool {
        self.buf.pos >= self.buf.src.len() && self.output.is_drained()
    }

    /// Tear down the pipeline without signalling completion.
    pub(crate) fn cancel(mut self) {
        self.done.take();
        for q in &self.stages {
            q.abort();
        }
    }

    fn finish(mut self) {
        if let Some(done) = self.done.take() {
            done.notify();
        }
    }
}

/// Voice list shared between the engine API and the output callback.
#[derive(Default)]
pub(crate) struct MixerShared {
    voices: Mutex<Vec<Voice>>,
}

impl MixerShared {
    pub(crate) fn voices(&self) -> MutexGuard<'_, Vec<Voice>> {
        self.voices.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mix one buffer worth of audio into `mix` (which must be zeroed).
    pub(crate) fn render(&self, mix: &mut [f32], dst_channels: usize, refill_max_frames: usize) {
        let mut retired = Vec::new();
        {
            let mut voices = self.voices();
            let mut i = 0;
            while i < voices.len() {
                let voice = &mut voices[i];
                if !voice.paused {
                    voice.mix_into(mix, dst_channels, refill_max_frames);
                    if voice.is_finished() {
                        retired.push(voices.swap_remove(i));
                        continue;
                    }
                }
                i += 1;
            }
        }
        for voice in retired {
            tracing::debug!(voice = voice.key, "voice reached end of stream");
            voice.finish();
        }
        for s in mix.iter_mut() {
            *s = s.clamp(-1.0, 1.0);
        }
    }
}

/// Build the shared output stream for `shared` in the device's sample format.
pub(crate) fn build_mixer_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    shared: Arc<MixerShared>,
    refill_max_frames: usize,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, shared, refill_max_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, shared, refill_max_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, shared, refill_max_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, shared, refill_max_frames),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<MixerShared>,
    refill_max_frames: usize,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let refill_max_frames = refill_max_frames.max(1);
    let mut mix: Vec<f32> = Vec::new();

    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            mix.clear();
            mix.resize(data.len(), 0.0);
            shared.render(&mut mix, channels_out, refill_max_frames);
            for (out, s) in data.iter_mut().zip(mix.iter()) {
                *out = <T as cpal::Sample>::from_sample::<f32>(*s);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// - mono -> stereo: duplicate
/// - stereo -> mono: average
/// - otherwise: clamp to the last available source channel
///
/// `buf.pos` advances one source frame after the last destination channel.
fn next_sample_mapped(buf: &mut VoiceBuffer, dst_channels: usize, dst_ch: usize) -> f32 {
    if buf.pos >= buf.src.len() {
        return 0.0;
    }

    let frame_start = buf.pos;
    let get_src = |ch: usize| -> f32 {
        if ch < buf.src_channels {
            buf.src.get(frame_start + ch).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    };

    let out = match (buf.src_channels, dst_channels) {
        (2, 1) => 0.5 * (get_src(0) + get_src(1)),
        (1, _) => get_src(0),
        _ => get_src(dst_ch.min(buf.src_channels.saturating_sub(1))),
    };

    if dst_ch + 1 == dst_channels {
        buf.pos += buf.src_channels;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Completion;

    fn voice_with(key: u64, channels: usize, samples: &[f32], close: bool, gain: f32) -> (Voice, Completion, Arc<SharedAudio>) {
        let q = Arc::new(SharedAudio::new(channels, 1 << 12));
        q.push_interleaved_blocking(samples);
        if close {
            q.close();
        }
        let (signal, completion) = Completion::pair();
        let voice = Voice::new(key, q.clone(), vec![q.clone()], gain, signal);
        (voice, completion, q)
    }

    #[test]
    fn mono_voice_is_duplicated_to_stereo_with_gain() {
        let shared = MixerShared::default();
        let (voice, _c, _q) = voice_with(1, 1, &[0.1, 0.2], false, 2.0);
        shared.voices().push(voice);

        let mut mix = vec![0.0; 4];
        shared.render(&mut mix, 2, 64);
        let expected = [0.2, 0.2, 0.4, 0.4];
        for (got, want) in mix.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6);
        }
    }

    #[test]
    fn voices_are_summed_and_clamped() {
        let shared = MixerShared::default();
        let (a, _ca, _qa) = voice_with(1, 1, &[0.6, 0.1], false, 1.0);
        let (b, _cb, _qb) = voice_with(2, 1, &[0.6, 0.1], false, 1.0);
        shared.voices().push(a);
        shared.voices().push(b);

        let mut mix = vec![0.0; 2];
        shared.render(&mut mix, 1, 64);
        assert_eq!(mix[0], 1.0);
        assert!((mix[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn paused_voice_is_silent_and_keeps_its_audio() {
        let shared = MixerShared::default();
        let (mut voice, _c, q) = voice_with(1, 1, &[0.5, 0.5], true, 1.0);
        voice.paused = true;
        shared.voices().push(voice);

        let mut mix = vec![0.0; 2];
        shared.render(&mut mix, 1, 64);
        assert_eq!(mix, vec![0.0, 0.0]);
        assert!(!q.is_drained());
        assert_eq!(shared.voices().len(), 1);
    }

    #[test]
    fn drained_voice_is_retired_and_completes() {
        let shared = MixerShared::default();
        let (voice, completion, _q) = voice_with(1, 1, &[0.5], true, 1.0);
        shared.voices().push(voice);

        let mut mix = vec![0.0; 4];
        shared.render(&mut mix, 1, 64);
        assert!(shared.voices().is_empty());
        assert!(completion.wait());
    }

    #[test]
    fn open_voice_with_underrun_stays_live() {
        let shared = MixerShared::default();
        let (voice, _c, _q) = voice_with(1, 1, &[0.5], false, 1.0);
        shared.voices().push(voice);

        let mut mix = vec![0.0; 4];
        shared.render(&mut mix, 1, 64);
        assert_eq!(shared.voices().len(), 1);
        assert_eq!(mix[1], 0.0);
    }

    #[test]
    fn cancelled_voice_never_completes() {
        let (voice, completion, q) = voice_with(1, 1, &[0.5], false, 1.0);
        voice.cancel();
        assert!(q.is_drained());
        assert!(!completion.wait());
    }

    #[test]
    fn stereo_to_mono_averages() {
        let mut buf = VoiceBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![0.2, 0.4],
        };
        assert!((next_sample_mapped(&mut buf, 1, 0) - 0.3).abs() < 1e-6);
        assert_eq!(buf.pos, 2);
    }
}
