/// Engine tuning parameters shared by the decode/resample/mix stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Output device substring (case-insensitive); `None` uses the host default.
    pub device: Option<String>,
    /// Preferred mixer output rate. The closest rate the device supports is used.
    pub preferred_rate: u32,
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled from a voice per refill inside the output callback.
    pub refill_max_frames: usize,
    /// Target buffer duration for each per-voice queue.
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            device: None,
            preferred_rate: 44_100,
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}
