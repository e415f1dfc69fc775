//! Bounded sample queues linking the per-voice stages.
//!
//! - decode thread -> queue
//! - resample thread -> queue
//! - mixer callback drains the last queue without blocking
//!
//! Closing a queue is how a voice is torn down: producers stop pushing, blocking
//! consumers wake up, and the mixer sees the voice as drained.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

/// Thread-safe bounded queue of interleaved `f32` samples.
///
/// The `done` flag lives under the same mutex as the samples so close/drain checks
/// never race with a concurrent push.
#[derive(Debug)]
pub(crate) struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
}

#[derive(Debug)]
struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// Strategy for popping interleaved frames.
pub(crate) enum PopStrategy {
    /// Block until exactly `frames` are available, or `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` right now, or `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio (2s when the value is unusable).
pub(crate) fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SharedAudio {
    pub(crate) fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    /// Whether the producer side has been closed (samples may remain).
    pub(crate) fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Closed and fully consumed.
    pub(crate) fn is_drained(&self) -> bool {
        let g = self.lock();
        g.done && g.queue.is_empty()
    }

    /// Mark the queue finished and wake every waiter. Idempotent.
    pub(crate) fn close(&self) {
        self.lock().done = true;
        self.cv.notify_all();
    }

    /// Discard buffered samples and close. Used when a voice is stopped.
    pub(crate) fn abort(&self) {
        {
            let mut g = self.lock();
            g.queue.clear();
            g.done = true;
        }
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full.
    ///
    /// Returns `false` if the queue was closed before every sample was accepted.
    pub(crate) fn push_interleaved_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;

        while offset < samples.len() {
            let mut g = self.lock();

            while g.queue.len() >= self.max_buffered_samples && !g.done {
                g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
            }
            if g.done {
                return false;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(samples[offset..offset + take].iter().copied());
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
        true
    }

    pub(crate) fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.queue.len() < want && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
                }
                if g.queue.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.queue.len() < self.channels && !g.done {
                    g = self.cv.wait(g).unwrap_or_else(|e| e.into_inner());
                }
                (g.queue.len() / self.channels).min(max_frames) * self.channels
            }
            PopStrategy::NonBlocking { max_frames } => {
                (g.queue.len() / self.channels).min(max_frames) * self.channels
            }
        };

        if take_samples == 0 {
            return None;
        }

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }
}
