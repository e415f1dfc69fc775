//! Configuration loading and resolution.
//!
//! Each setting resolves as: command-line flag, then TOML file, then built-in default.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub use audio_player::config::PlaybackConfig;
use audioserver_proto::DEFAULT_MAX_FRAME_BYTES;

use crate::cli::Args;

pub const DEFAULT_SOCKET_PATH: &str = "/tmp/audioserver.sock";

/// Optional settings loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub socket: Option<PathBuf>,
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub chunk_frames: Option<usize>,
    pub refill_max_frames: Option<usize>,
    pub buffer_seconds: Option<f32>,
    pub max_frame_bytes: Option<u32>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        toml::from_str::<FileConfig>(&raw).with_context(|| format!("parse config {:?}", path))
    }
}

/// Fully resolved server settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub socket: PathBuf,
    pub max_frame_bytes: u32,
    pub playback: PlaybackConfig,
}

impl ServerConfig {
    /// Load the config file named by `--config` (if any) and resolve against `args`.
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match args.config.as_deref() {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(args, file))
    }

    pub fn resolve(args: &Args, file: FileConfig) -> Self {
        let defaults = PlaybackConfig::default();
        let device = normalize_device_name(args.device.clone().or(file.device));
        Self {
            socket: args
                .socket
                .clone()
                .or(file.socket)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH)),
            max_frame_bytes: args
                .max_frame_bytes
                .or(file.max_frame_bytes)
                .unwrap_or(DEFAULT_MAX_FRAME_BYTES),
            playback: PlaybackConfig {
                device,
                preferred_rate: args
                    .sample_rate
                    .or(file.sample_rate)
                    .unwrap_or(defaults.preferred_rate),
                chunk_frames: args
                    .chunk_frames
                    .or(file.chunk_frames)
                    .unwrap_or(defaults.chunk_frames),
                refill_max_frames: args
                    .refill_max_frames
                    .or(file.refill_max_frames)
                    .unwrap_or(defaults.refill_max_frames),
                buffer_seconds: args
                    .buffer_seconds
                    .or(file.buffer_seconds)
                    .unwrap_or(defaults.buffer_seconds),
            },
        }
    }
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
