//! Local audio playback server.
//!
//! Clients connect over a Unix socket and send length-prefixed `{action, payload}`
//! frames to start, pause, resume and stop playback sessions keyed by a numeric id.
//!
//! - [`connection`] reads frames and hands each envelope off as an independent task.
//! - [`dispatch`] maps actions to [`registry`] operations.
//! - [`registry`] owns the id -> session table and drives the [`engine::AudioEngine`].
//! - [`server`] binds the socket, cleans it up and accepts connections.

pub mod cli;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod registry;
pub mod runtime;
pub mod server;

pub use dispatch::{DispatchError, Dispatcher};
pub use engine::AudioEngine;
pub use registry::{Registry, RegistryError, SessionState};
