//! Wire protocol shared by `audioserver` and `audioserver-cli`.
//!
//! The protocol is a sequence of frames over a local byte stream (Unix socket):
//! - len: u32 BE
//! - payload: [u8; len]
//!
//! Each frame carries one JSON envelope:
//! - `{"action": <int>, "payload": "<base64 inner JSON>"}`
//! - `action` 0 = play, 1 = pause, 2 = resume, 3 = stop
//!
//! Control is fire-and-forget: the server never writes frames back.

mod envelope;
mod error;
mod frame;
mod request;

pub use envelope::{Envelope, decode_envelope, decode_payload, encode_envelope, encode_request};
pub use error::{DecodeError, FrameError};
pub use frame::{
    DEFAULT_MAX_FRAME_BYTES, LEN_PREFIX_BYTES, encode_frame, frame_len, read_frame, write_frame,
};
pub use request::{Action, IdRequest, PlayRequest, PlaySource, Request, SessionId};
