use std::path::PathBuf;

use clap::Parser;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

/// Server flags. Unset flags fall back to the TOML config, then to built-in defaults.
#[derive(Parser, Debug, Default)]
#[command(name = "audioserver", version = VERSION)]
pub struct Args {
    /// Unix socket path to listen on [default: /tmp/audioserver.sock]
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Optional TOML config file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Preferred mixer output rate in Hz [default: 44100]
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Resampler input chunk size in frames [default: 1024]
    #[arg(long)]
    pub chunk_frames: Option<usize>,

    /// Max frames pulled per voice in one output callback refill [default: 4096]
    #[arg(long)]
    pub refill_max_frames: Option<usize>,

    /// Per-voice queue buffer target in seconds [default: 2.0]
    #[arg(long)]
    pub buffer_seconds: Option<f32>,

    /// Largest accepted inbound frame in bytes [default: 268435456]
    #[arg(long)]
    pub max_frame_bytes: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_optional() {
        let args = Args::try_parse_from(["audioserver"]).unwrap();
        assert!(args.socket.is_none());
        assert!(args.sample_rate.is_none());
        assert!(!args.list_devices);
    }

    #[test]
    fn parses_tuning_flags() {
        let args = Args::try_parse_from([
            "audioserver",
            "--socket",
            "/run/audio.sock",
            "--sample-rate",
            "48000",
            "--buffer-seconds",
            "0.5",
            "--device",
            "USB",
        ])
        .unwrap();
        assert_eq!(args.socket, Some(PathBuf::from("/run/audio.sock")));
        assert_eq!(args.sample_rate, Some(48_000));
        assert_eq!(args.buffer_seconds, Some(0.5));
        assert_eq!(args.device.as_deref(), Some("USB"));
    }
}
