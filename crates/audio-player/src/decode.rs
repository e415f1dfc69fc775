//! Per-voice streaming decode stage.
//!
//! Uses Symphonia to:
//! - probe the source container/codec (synchronously, so format errors reach the caller)
//! - decode packets into interleaved `f32` samples on a background thread
//! - restart from the top of the source when the voice loops

use std::sync::Arc;
use std::thread;

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::engine::StartError;
use crate::queue::{SharedAudio, calc_max_buffered_samples};
use crate::source::OpenedSource;

/// A probed source with a ready decoder.
struct Probed {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: SignalSpec,
}

fn probe(source: &OpenedSource, hint: &Hint) -> Result<Probed, StartError> {
    let mss = MediaSourceStream::new(source.media_source()?, Default::default());

    let probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| StartError::UnsupportedFormat(format!("probe: {e}")))?;

    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| StartError::UnsupportedFormat("no default audio track".to_string()))?;

    let track_id = track.id;
    let codec_params: CodecParameters = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or_else(|| StartError::UnsupportedFormat("unknown channel layout".to_string()))?;
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| StartError::UnsupportedFormat("unknown sample rate".to_string()))?;

    let decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| StartError::UnsupportedFormat(format!("codec: {e}")))?;

    Ok(Probed {
        format,
        decoder,
        track_id,
        spec: SignalSpec::new(rate, channels),
    })
}

/// Probe `source` and start a decoder thread feeding a new bounded queue.
///
/// The queue is closed on end-of-stream (non-looping), on a failed restart, or
/// when a consumer closes it first.
pub(crate) fn start_voice_decode(
    source: OpenedSource,
    hint: Hint,
    buffer_seconds: f32,
    looping: bool,
) -> Result<(SignalSpec, Arc<SharedAudio>), StartError> {
    let first = probe(&source, &hint)?;
    let spec = first.spec;
    let channels = spec.channels.count();

    let max_buffered_samples = calc_max_buffered_samples(spec.rate, channels, buffer_seconds);
    let shared = Arc::new(SharedAudio::new(channels, max_buffered_samples));
    let shared_for_thread = shared.clone();

    thread::Builder::new()
        .name("voice-decode".to_string())
        .spawn(move || {
            decode_passes(first, &source, &hint, looping, &shared_for_thread);
            shared_for_thread.close();
        })
        .map_err(|e| StartError::SourceUnavailable(format!("spawn decoder thread: {e}")))?;

    Ok((spec, shared))
}

fn decode_passes(
    first: Probed,
    source: &OpenedSource,
    hint: &Hint,
    looping: bool,
    shared: &SharedAudio,
) {
    let mut pass = first;
    loop {
        let frames = decode_format_loop(&mut pass, shared);
        if !looping || shared.is_done() {
            return;
        }
        if frames == 0 {
            tracing::warn!("looping source produced no audio; ending voice");
            return;
        }
        pass = match probe(source, hint) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("loop restart failed: {e}");
                return;
            }
        };
    }
}

/// Decode packets until end-of-stream or until the queue is closed.
///
/// Returns the number of frames pushed.
fn decode_format_loop(pass: &mut Probed, shared: &SharedAudio) -> u64 {
    let mut frames = 0u64;

    loop {
        let packet = match pass.format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };
        if packet.track_id() != pass.track_id {
            continue;
        }

        let decoded = match pass.decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        if decoded.frames() == 0 {
            continue;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);

        if !shared.push_interleaved_blocking(sample_buf.samples()) {
            break;
        }
        frames += (sample_buf.samples().len() / shared.channels()) as u64;
    }

    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::PopStrategy;
    use crate::source::format_hint;

    /// Minimal 16-bit PCM mono WAV.
    fn wav_bytes(rate: u32, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    fn drain(q: &SharedAudio) -> Vec<f32> {
        let mut all = Vec::new();
        while let Some(chunk) = q.pop(PopStrategy::BlockingUpTo { max_frames: 1024 }) {
            all.extend(chunk);
        }
        all
    }

    #[test]
    fn decodes_in_memory_wav_and_closes_queue() {
        let source = OpenedSource::Memory(wav_bytes(8_000, &[0, 16_384, -16_384, 0]).into());
        let (spec, q) =
            start_voice_decode(source, format_hint("wav").unwrap(), 1.0, false).unwrap();
        assert_eq!(spec.rate, 8_000);
        assert_eq!(spec.channels.count(), 1);

        let samples = drain(&q);
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!(q.is_drained());
    }

    #[test]
    fn looping_voice_repeats_until_closed() {
        let source = OpenedSource::Memory(wav_bytes(8_000, &[100, 200, 300]).into());
        let (_spec, q) =
            start_voice_decode(source, format_hint("wav").unwrap(), 1.0, true).unwrap();

        let mut seen = 0usize;
        while seen < 30 {
            let chunk = q.pop(PopStrategy::BlockingUpTo { max_frames: 64 }).unwrap();
            seen += chunk.len();
        }
        assert!(!q.is_done());
        q.abort();
        assert!(q.is_drained());
    }

    #[test]
    fn garbage_is_unsupported_format() {
        let source = OpenedSource::Memory(b"this is not audio at all".to_vec().into());
        let err = start_voice_decode(source, format_hint("mp3").unwrap(), 1.0, false).unwrap_err();
        assert!(matches!(err, StartError::UnsupportedFormat(_)));
    }
}
