//! Output device discovery and stream configuration for the mixer.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Upper bound for a fixed device buffer. Pause/stop latency is bounded by one buffer.
const MAX_BUFFER_FRAMES: u32 = 2_048;

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Choose the output config closest to `preferred_rate`.
///
/// Ranking: a rate at or below the preference beats one above it, then higher rate wins,
/// then the better sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    preferred_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    device
        .supported_output_configs()
        .context("query supported output configs")?
        .map(|range| {
            let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), preferred_rate);
            let key = RateKey {
                at_or_below: rate <= preferred_rate,
                rate,
                format_rank: sample_format_rank(range.sample_format()),
            };
            (key, range.with_sample_rate(rate))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Pick a fixed stream buffer size, or `None` to let CPAL use the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed(clamp_buffer(*min, *max)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout (for `--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct RateKey {
    at_or_below: bool,
    rate: u32,
    // Reversed so that a lower rank compares greater.
    format_rank: std::cmp::Reverse<u8>,
}

fn clamp_rate(min: u32, max: u32, preferred: u32) -> u32 {
    preferred.clamp(min, max.max(min))
}

fn clamp_buffer(min: u32, max: u32) -> u32 {
    max.min(MAX_BUFFER_FRAMES).max(min)
}

fn sample_format_rank(format: cpal::SampleFormat) -> std::cmp::Reverse<u8> {
    let rank = match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    };
    std::cmp::Reverse(rank)
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
