//! Length-prefixed framing.
//!
//! Frame format:
//! - len: u32 BE
//! - payload: [u8; len]

use std::io::{self, Read, Write};

use crate::error::FrameError;

/// Size of the big-endian length prefix.
pub const LEN_PREFIX_BYTES: usize = 4;

/// Inbound frame limit used when the server is not configured otherwise (256 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

/// Initial payload allocation cap; larger frames grow as bytes actually arrive.
const READ_CHUNK_HINT: usize = 64 * 1024;

/// Convert a payload length into the wire prefix value.
pub fn frame_len(len: usize) -> Result<u32, FrameError> {
    u32::try_from(len).map_err(|_| FrameError::Oversized {
        len: len as u64,
        max: u64::from(u32::MAX),
    })
}

/// Encode a frame into a single buffer (prefix + payload).
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = frame_len(payload.len())?;
    let mut out = Vec::with_capacity(LEN_PREFIX_BYTES + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Write one frame and flush.
pub fn write_frame(mut w: impl Write, payload: &[u8]) -> Result<(), FrameError> {
    let frame = encode_frame(payload)?;
    w.write_all(&frame)?;
    w.flush()?;
    Ok(())
}

/// Read one frame payload.
///
/// Returns `Ok(None)` when the stream ends cleanly before the first byte of a frame.
/// Any shortfall after that point is [`FrameError::Truncated`]. A declared length above
/// `max_len` is rejected before any payload is read.
pub fn read_frame(mut r: impl Read, max_len: u32) -> Result<Option<Vec<u8>>, FrameError> {
    let mut prefix = [0u8; LEN_PREFIX_BYTES];
    let mut filled = 0usize;
    while filled < LEN_PREFIX_BYTES {
        match r.read(&mut prefix[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(FrameError::Truncated {
                    expected: LEN_PREFIX_BYTES,
                    got: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FrameError::Io(e)),
        }
    }

    let len = u32::from_be_bytes(prefix);
    if len > max_len {
        return Err(FrameError::Oversized {
            len: u64::from(len),
            max: u64::from(max_len),
        });
    }

    let expected = len as usize;
    let mut payload = Vec::with_capacity(expected.min(READ_CHUNK_HINT));
    r.take(u64::from(len)).read_to_end(&mut payload)?;
    if payload.len() < expected {
        return Err(FrameError::Truncated {
            expected,
            got: payload.len(),
        });
    }

    Ok(Some(payload))
}
