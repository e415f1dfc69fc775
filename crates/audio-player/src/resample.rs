//! Per-voice resample stage.
//!
//! Uses Rubato to convert a voice's decoded audio from its source rate to the mixer
//! output rate. Runs in a background thread between two bounded queues.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};
use symphonia::core::audio::SignalSpec;

use crate::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};

#[derive(Clone, Copy, Debug)]
pub(crate) struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Buffering (seconds) for the output queue.
    pub buffer_seconds: f32,
}

/// Start a resampler thread reading `srcq` at `src_spec.rate` and writing `dst_rate`.
///
/// The output queue closes once `srcq` is drained. Closing the output queue early
/// (voice stopped) makes the thread exit at the next chunk.
pub(crate) fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_spec: SignalSpec,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SharedAudio>> {
    let channels = src_spec.channels.count();
    let max_buffered_samples = calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds);
    let dstq = Arc::new(SharedAudio::new(channels, max_buffered_samples));

    let f_ratio = dst_rate as f64 / src_spec.rate as f64;
    let chunk_in_frames = cfg.chunk_frames.max(1);

    let dstq_thread = dstq.clone();
    thread::Builder::new()
        .name("voice-resample".to_string())
        .spawn(move || {
            if let Err(e) = resample_loop(&srcq, &dstq_thread, f_ratio, channels, chunk_in_frames) {
                tracing::error!("resampler error: {e:#}");
            }
            dstq_thread.close();
        })
        .context("spawn resampler thread")?;

    Ok(dstq)
}

fn sinc_params() -> SincInterpolationParameters {
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    }
}

fn resample_loop(
    srcq: &SharedAudio,
    dstq: &SharedAudio,
    f_ratio: f64,
    channels: usize,
    chunk_in_frames: usize,
) -> Result<()> {
    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &sinc_params(),
        chunk_in_frames,
        channels,
        FixedAsync::Input,
    )
    .context("resampler init")?;

    let mut out_interleaved = vec![0.0f32; channels * resampler.output_frames_max()];
    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    // Steady state: whole chunks. Then: the tail, flagged as partial.
    loop {
        if dstq.is_done() {
            return Ok(());
        }
        let (interleaved, partial) =
            match srcq.pop(PopStrategy::BlockingExact { frames: chunk_in_frames }) {
                Some(v) => (v, None),
                None => match srcq.pop(PopStrategy::BlockingUpTo { max_frames: chunk_in_frames }) {
                    Some(tail) => {
                        let frames = tail.len() / channels;
                        (tail, Some(frames))
                    }
                    None => return Ok(()),
                },
            };

        let in_frames = interleaved.len() / channels;
        let input_adapter = InterleavedSlice::new(&interleaved, channels, in_frames)
            .context("interleaved slice (input)")?;
        let out_capacity_frames = out_interleaved.len() / channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_interleaved, channels, out_capacity_frames)
                .context("interleaved slice (output)")?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = partial;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .context("resampler process")?;

        let produced_samples = nbr_out * channels;
        if produced_samples > 0 && !dstq.push_interleaved_blocking(&out_interleaved[..produced_samples]) {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::Channels;

    #[test]
    fn upsamples_and_closes_output() {
        let srcq = Arc::new(SharedAudio::new(1, 1 << 16));
        let tone: Vec<f32> = (0..8_000).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        srcq.push_interleaved_blocking(&tone);
        srcq.close();

        let spec = SignalSpec::new(8_000, Channels::FRONT_LEFT);
        let dstq = start_resampler(
            srcq,
            spec,
            16_000,
            ResampleConfig {
                chunk_frames: 256,
                buffer_seconds: 4.0,
            },
        )
        .unwrap();

        let mut produced = 0usize;
        while let Some(chunk) = dstq.pop(PopStrategy::BlockingUpTo { max_frames: 4096 }) {
            produced += chunk.len();
        }
        // Roughly twice the input, minus resampler delay.
        assert!(produced > 12_000, "produced {produced}");
        assert!(produced <= 16_500, "produced {produced}");
        assert!(dstq.is_drained());
    }

    fn resample_tone(src_rate: u32, dst_rate: u32) -> usize {
        let srcq = Arc::new(SharedAudio::new(1, 1 << 16));
        let tone: Vec<f32> = (0..src_rate).map(|i| ((i as f32) * 0.05).sin() * 0.5).collect();
        srcq.push_interleaved_blocking(&tone);
        srcq.close();

        let dstq = start_resampler(
            srcq,
            SignalSpec::new(src_rate, Channels::FRONT_LEFT),
            dst_rate,
            ResampleConfig {
                chunk_frames: 1024,
                buffer_seconds: 2.0,
            },
        )
        .unwrap();

        let mut produced = 0usize;
        while let Some(chunk) = dstq.pop(PopStrategy::BlockingUpTo { max_frames: 4096 }) {
            produced += chunk.len();
        }
        produced
    }

    #[test]
    fn large_upsample_ratios_produce_a_full_second() {
        for src_rate in [8_000, 11_025] {
            let produced = resample_tone(src_rate, 44_100);
            assert!(produced > 40_000, "{src_rate} Hz produced {produced}");
            assert!(produced < 48_000, "{src_rate} Hz produced {produced}");
        }
    }

    #[test]
    fn stops_when_output_is_closed() {
        let srcq = Arc::new(SharedAudio::new(2, 1 << 12));
        let spec = SignalSpec::new(22_050, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let dstq = start_resampler(
            srcq.clone(),
            spec,
            44_100,
            ResampleConfig {
                chunk_frames: 128,
                buffer_seconds: 0.1,
            },
        )
        .unwrap();

        dstq.abort();
        srcq.close();
        assert!(dstq.pop(PopStrategy::BlockingUpTo { max_frames: 16 }).is_none());
    }
}
