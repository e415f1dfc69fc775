use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audioserver::cli::Args;
use audioserver::config::ServerConfig;
use audioserver::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,audioserver=info,audio_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }

    let config = ServerConfig::from_args(&args)?;
    runtime::run(config)
}
