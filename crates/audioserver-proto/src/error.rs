use std::io;

use thiserror::Error;

/// Errors produced while encoding or reading length-prefixed frames.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Payload length does not fit the u32 prefix, or exceeds the reader's limit.
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    Oversized { len: u64, max: u64 },

    /// The stream ended part-way through a frame.
    #[error("truncated frame: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Per-message decode failures. None of these are fatal to a connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The outer `{action, payload}` document is malformed.
    #[error("malformed envelope: {0}")]
    Envelope(String),

    /// The inner document does not match the request type for `action`.
    #[error("malformed payload for action {action}: {source}")]
    Payload {
        action: i64,
        #[source]
        source: serde_json::Error,
    },

    #[error("unrecognized action {0}")]
    UnrecognizedAction(i64),
}
