//! Multi-voice playback engine.
//!
//! Each started voice gets its own pipeline:
//! 1. **Decode**: a background thread uses Symphonia to decode the source into interleaved `f32`
//!    (restarting from the top when the voice loops).
//! 2. **Resample**: when the source rate differs from the output rate, a Rubato stage converts it.
//! 3. **Mix**: a single CPAL output stream sums every live voice, applying per-voice gain and pause.
//!
//! A voice that reaches end-of-stream on its own is removed by the mixer and its
//! [`Completion`] fires. Voices removed with [`Engine::stop`] never fire.

pub mod config;
pub mod device;
pub mod engine;
pub mod source;

mod decode;
mod mixer;
mod queue;
mod resample;

pub use engine::{Completion, CompletionSignal, Engine, OutputFormat, StartError, VoiceHandle};
pub use source::{Source, VoiceRequest};
