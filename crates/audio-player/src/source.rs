//! Voice sources: where the encoded audio for a voice comes from.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

use crate::engine::StartError;

/// Encoded audio handed to [`crate::Engine::play`].
#[derive(Clone, Copy, Debug)]
pub enum Source<'a> {
    /// A file readable by the server process.
    File(&'a Path),
    /// Gzip-compressed audio bytes.
    Gzip(&'a [u8]),
}

/// Everything the engine needs to start one voice.
#[derive(Clone, Copy, Debug)]
pub struct VoiceRequest<'a> {
    /// Codec tag (`mp3`, `wav`, ...).
    pub format: &'a str,
    pub source: Source<'a>,
    /// Gain is `2^gain_exponent`.
    pub gain_exponent: i64,
    /// Restart from the beginning on end-of-stream until stopped.
    pub looping: bool,
}

/// Gain exponents outside this range are clamped before use.
pub const MIN_GAIN_EXPONENT: i64 = -24;
pub const MAX_GAIN_EXPONENT: i64 = 8;

impl VoiceRequest<'_> {
    pub fn gain(&self) -> f32 {
        let exp = self.gain_exponent.clamp(MIN_GAIN_EXPONENT, MAX_GAIN_EXPONENT);
        2f32.powi(exp as i32)
    }
}

/// Map a client codec tag to a Symphonia probe hint.
///
/// Returns `None` for tags the engine does not decode.
pub fn format_hint(tag: &str) -> Option<Hint> {
    let ext = match tag.trim().to_ascii_lowercase().as_str() {
        "mp3" => "mp3",
        "wav" | "wave" => "wav",
        "flac" => "flac",
        "ogg" | "oga" | "vorbis" => "ogg",
        "aac" => "aac",
        "m4a" | "mp4" | "alac" => "m4a",
        "aiff" | "aif" => "aiff",
        _ => return None,
    };
    let mut hint = Hint::new();
    hint.with_extension(ext);
    Some(hint)
}

/// A source that can be reopened from the start (needed for looping).
#[derive(Clone, Debug)]
pub(crate) enum OpenedSource {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

impl OpenedSource {
    /// Resolve a [`Source`], gunzipping in-memory data up front.
    pub(crate) fn open(source: Source<'_>) -> Result<Self, StartError> {
        match source {
            Source::File(path) => {
                if !path.is_file() {
                    return Err(StartError::SourceUnavailable(format!(
                        "{} is not a readable file",
                        path.display()
                    )));
                }
                Ok(OpenedSource::File(path.to_path_buf()))
            }
            Source::Gzip(bytes) => {
                let mut out = Vec::new();
                GzDecoder::new(bytes)
                    .read_to_end(&mut out)
                    .map_err(|e| StartError::SourceUnavailable(format!("gunzip audio data: {e}")))?;
                if out.is_empty() {
                    return Err(StartError::SourceUnavailable(
                        "audio data is empty after decompression".to_string(),
                    ));
                }
                Ok(OpenedSource::Memory(out.into()))
            }
        }
    }

    /// Open a fresh reader positioned at the start of the source.
    pub(crate) fn media_source(&self) -> Result<Box<dyn MediaSource>, StartError> {
        match self {
            OpenedSource::File(path) => {
                let file = File::open(path).map_err(|e| {
                    StartError::SourceUnavailable(format!("open {}: {e}", path.display()))
                })?;
                Ok(Box::new(file))
            }
            OpenedSource::Memory(bytes) => Ok(Box::new(std::io::Cursor::new(bytes.clone()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(bytes).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn format_hint_accepts_known_tags_case_insensitively() {
        for tag in ["mp3", "WAV", " flac ", "ogg", "aac", "m4a", "aiff"] {
            assert!(format_hint(tag).is_some(), "{tag}");
        }
    }

    #[test]
    fn format_hint_rejects_unknown_tags() {
        assert!(format_hint("midi").is_none());
        assert!(format_hint("").is_none());
    }

    #[test]
    fn gain_is_power_of_two() {
        let mut req = VoiceRequest {
            format: "wav",
            source: Source::Gzip(&[]),
            gain_exponent: 0,
            looping: false,
        };
        assert_eq!(req.gain(), 1.0);
        req.gain_exponent = -2;
        assert_eq!(req.gain(), 0.25);
        req.gain_exponent = 3;
        assert_eq!(req.gain(), 8.0);
        req.gain_exponent = i64::MAX;
        assert_eq!(req.gain(), 256.0);
        req.gain_exponent = i64::MIN;
        assert!(req.gain() > 0.0);
    }

    #[test]
    fn gzip_source_is_decompressed() {
        let packed = gzip(b"RIFF....WAVE");
        match OpenedSource::open(Source::Gzip(&packed)).unwrap() {
            OpenedSource::Memory(bytes) => assert_eq!(&bytes[..], b"RIFF....WAVE"),
            other => panic!("unexpected source: {other:?}"),
        }
    }

    #[test]
    fn corrupt_gzip_is_unavailable() {
        let err = OpenedSource::open(Source::Gzip(b"not gzip at all")).unwrap_err();
        assert!(matches!(err, StartError::SourceUnavailable(_)));
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = OpenedSource::open(Source::File(Path::new("/definitely/not/here.wav"))).unwrap_err();
        assert!(matches!(err, StartError::SourceUnavailable(_)));
    }
}
