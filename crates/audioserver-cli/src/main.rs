//! `audioserver-cli`: send one control action to a running `audioserver`.
//!
//! The protocol is fire-and-forget: the command exits once the frame is written.

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use audioserver_proto::{IdRequest, PlayRequest, Request, encode_request, write_frame};
use clap::{Parser, Subcommand};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "audioserver-cli", version)]
struct Args {
    /// Server socket path
    #[arg(long, default_value = "/tmp/audioserver.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a session
    Play {
        #[arg(long)]
        id: i64,
        /// Codec tag, e.g. mp3 or wav
        #[arg(long)]
        format: String,
        /// Audio file path
        #[arg(long)]
        path: PathBuf,
        /// Send the file contents (gzip-compressed) instead of its path
        #[arg(long)]
        as_data: bool,
        /// Base-2 gain exponent (-1 halves, 1 doubles)
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        volume: i64,
        /// Repeat until stopped
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Pause a session
    Pause {
        #[arg(long)]
        id: i64,
    },
    /// Resume a paused session
    Resume {
        #[arg(long)]
        id: i64,
    },
    /// Stop a session
    Stop {
        #[arg(long)]
        id: i64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let request = build_request(args.cmd)?;
    let frame = encode_request(&request).context("encode request")?;

    let mut stream = UnixStream::connect(&args.socket)
        .with_context(|| format!("connect {}", args.socket.display()))?;
    write_frame(&mut stream, &frame).context("send frame")?;
    tracing::info!(request = %request, "sent");
    Ok(())
}

fn build_request(cmd: Command) -> Result<Request> {
    let request = match cmd {
        Command::Play {
            id,
            format,
            path,
            as_data,
            volume,
            looping,
        } => {
            if format.trim().is_empty() {
                bail!("--format must not be empty");
            }
            if path.as_os_str().is_empty() {
                bail!("--path must not be empty");
            }
            let mut play = PlayRequest {
                id,
                format,
                volume,
                looping,
                ..Default::default()
            };
            if as_data {
                play.data = gzip_file(&path)?;
            } else {
                play.path = absolute_path(&path)?;
            }
            Request::Play(play)
        }
        Command::Pause { id } => Request::Pause(IdRequest { id }),
        Command::Resume { id } => Request::Resume(IdRequest { id }),
        Command::Stop { id } => Request::Stop(IdRequest { id }),
    };
    Ok(request)
}

/// The server resolves paths relative to its own working directory.
fn absolute_path(path: &Path) -> Result<String> {
    let abs = std::path::absolute(path).with_context(|| format!("resolve {}", path.display()))?;
    abs.into_os_string()
        .into_string()
        .map_err(|p| anyhow::anyhow!("path is not valid UTF-8: {}", p.to_string_lossy()))
}

fn gzip_file(path: &Path) -> Result<Vec<u8>> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(&raw)?;
    Ok(enc.finish()?)
}
