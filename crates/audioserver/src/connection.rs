//! Connection loop: frames in, envelopes out, each dispatched as its own task.

use std::io::Read;

use audioserver_proto::{Envelope, FrameError, decode_envelope, read_frame};

use crate::dispatch::Dispatcher;
use crate::engine::AudioEngine;

/// Read frames until end-of-stream, handing every decodable envelope to `on_envelope`.
///
/// Undecodable envelopes are logged and skipped. Returns the number of frames read;
/// a truncated frame or I/O error ends the loop with that error.
pub fn read_envelopes(
    mut reader: impl Read,
    max_frame_bytes: u32,
    mut on_envelope: impl FnMut(Envelope),
) -> Result<usize, FrameError> {
    let mut frames = 0usize;
    while let Some(frame) = read_frame(&mut reader, max_frame_bytes)? {
        frames += 1;
        match decode_envelope(&frame) {
            Ok(envelope) => on_envelope(envelope),
            Err(e) => tracing::warn!(frame_bytes = frame.len(), "message dropped: {e}"),
        }
    }
    Ok(frames)
}

/// Serve one client connection, dispatching each message on its own thread.
pub fn serve_connection<E: AudioEngine>(
    reader: impl Read,
    dispatcher: &Dispatcher<E>,
    max_frame_bytes: u32,
) -> Result<usize, FrameError> {
    read_envelopes(reader, max_frame_bytes, |envelope| {
        if let Err(e) = dispatcher.spawn(envelope) {
            tracing::error!("spawn dispatch worker: {e}");
        }
    })
}
