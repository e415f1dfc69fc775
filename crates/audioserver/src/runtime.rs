//! Server runtime wiring: engine, registry, dispatcher and socket.

use anyhow::{Context, Result};

use audio_player::{Engine, device};

use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::server;

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Start the audio engine and serve the control socket until a shutdown signal.
pub fn run(config: ServerConfig) -> Result<()> {
    let engine = Engine::start(config.playback.clone()).context("start audio engine")?;
    let output = engine.output_format();
    tracing::info!(
        output_rate_hz = output.sample_rate,
        channels = output.channels,
        "audio engine ready"
    );

    let dispatcher = Dispatcher::new(Registry::new(engine));
    let (listener, guard) = server::bind(&config.socket)?;
    server::install_signal_cleanup(guard.path())?;

    server::serve(&listener, &dispatcher, config.max_frame_bytes);
    Ok(())
}
