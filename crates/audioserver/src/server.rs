//! Unix socket lifecycle and accept loop.

use std::io;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result};

use crate::connection::serve_connection;
use crate::dispatch::Dispatcher;
use crate::engine::AudioEngine;

/// Owns the socket path; the file is removed when the guard is dropped.
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        remove_socket_file(&self.path);
    }
}

/// Remove a leftover socket file from a previous run. A missing file is fine.
pub fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::warn!(path = %path.display(), "removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove stale socket {}", path.display())),
    }
}

/// Clear any stale socket at `path` and bind a new listener there.
pub fn bind(path: &Path) -> Result<(UnixListener, SocketGuard)> {
    remove_stale_socket(path)?;
    let listener =
        UnixListener::bind(path).with_context(|| format!("bind socket {}", path.display()))?;
    tracing::info!(path = %path.display(), "listening");
    Ok((
        listener,
        SocketGuard {
            path: path.to_path_buf(),
        },
    ))
}

/// Remove the socket file and exit on SIGINT/SIGTERM.
pub fn install_signal_cleanup(path: &Path) -> Result<()> {
    let path = path.to_path_buf();
    ctrlc::set_handler(move || {
        tracing::info!("shutdown signal received");
        remove_socket_file(&path);
        std::process::exit(130);
    })
    .context("install signal handler")
}

/// Accept clients forever, one thread per connection.
///
/// Accept errors are logged and the loop keeps going.
pub fn serve<E: AudioEngine>(
    listener: &UnixListener,
    dispatcher: &Dispatcher<E>,
    max_frame_bytes: u32,
) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => spawn_connection(stream, dispatcher.clone(), max_frame_bytes),
            Err(e) => tracing::warn!("accept error: {e}"),
        }
    }
}

fn spawn_connection<E: AudioEngine>(
    stream: UnixStream,
    dispatcher: Dispatcher<E>,
    max_frame_bytes: u32,
) {
    let spawned = thread::Builder::new()
        .name("connection".to_string())
        .spawn(move || {
            tracing::info!("client connected");
            match serve_connection(&stream, &dispatcher, max_frame_bytes) {
                Ok(frames) => tracing::info!(frames, "connection closed"),
                Err(e) => tracing::warn!("connection closed: {e}"),
            }
        });
    if let Err(e) = spawned {
        tracing::error!("spawn connection thread: {e}");
    }
}

fn remove_socket_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(path = %path.display(), "removed socket file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), "remove socket file: {e}"),
    }
}
