//! The seam between the session registry and the audio engine.

use std::path::Path;

use audio_player::{Completion, Engine, Source, StartError, VoiceHandle, VoiceRequest};
use audioserver_proto::{PlayRequest, PlaySource};

/// Operations the registry needs from an audio engine.
///
/// `start` returns once playback has begun; the [`Completion`] fires on natural
/// end-of-stream and never fires for a voice released through `stop`.
pub trait AudioEngine: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn start(&self, request: &PlayRequest) -> Result<(Self::Handle, Completion), StartError>;
    fn pause(&self, handle: &Self::Handle);
    fn resume(&self, handle: &Self::Handle);
    fn stop(&self, handle: Self::Handle);
}

impl AudioEngine for Engine {
    type Handle = VoiceHandle;

    fn start(&self, request: &PlayRequest) -> Result<(VoiceHandle, Completion), StartError> {
        let source = match request.source() {
            Some(PlaySource::Path(path)) => Source::File(Path::new(path)),
            Some(PlaySource::Data(bytes)) => Source::Gzip(bytes),
            None => return Err(StartError::SourceUnavailable("no audio data provided".to_string())),
        };
        self.play(&VoiceRequest {
            format: &request.format,
            source,
            gain_exponent: request.volume,
            looping: request.looping,
        })
    }

    fn pause(&self, handle: &VoiceHandle) {
        if !Engine::pause(self, handle) {
            tracing::debug!(voice = handle.key(), "pause: voice already ended");
        }
    }

    fn resume(&self, handle: &VoiceHandle) {
        if !Engine::resume(self, handle) {
            tracing::debug!(voice = handle.key(), "resume: voice already ended");
        }
    }

    fn stop(&self, handle: VoiceHandle) {
        let key = handle.key();
        if !Engine::stop(self, handle) {
            tracing::debug!(voice = key, "stop: voice already ended");
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! Scriptable in-memory engine for registry and dispatcher tests.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Mutex, MutexGuard};

    use audio_player::{Completion, CompletionSignal, StartError};
    use audioserver_proto::{PlayRequest, SessionId};
    use crossbeam_channel::Receiver;

    use super::AudioEngine;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub(crate) enum Call {
        Start { voice: u64, id: SessionId },
        Pause(u64),
        Resume(u64),
        Stop(u64),
    }

    #[derive(Debug)]
    pub(crate) struct FakeHandle(pub u64);

    #[derive(Default)]
    pub(crate) struct FakeEngine {
        next_voice: AtomicU64,
        calls: Mutex<Vec<Call>>,
        signals: Mutex<HashMap<u64, CompletionSignal>>,
        fail_next: Mutex<Option<StartError>>,
        gate: Mutex<Option<Receiver<()>>>,
    }

    fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
        m.lock().unwrap_or_else(|e| e.into_inner())
    }

    impl FakeEngine {
        pub(crate) fn calls(&self) -> Vec<Call> {
            lock(&self.calls).clone()
        }

        /// Make the next `start` fail with `err`.
        pub(crate) fn fail_next(&self, err: StartError) {
            *lock(&self.fail_next) = Some(err);
        }

        /// Make the next `start` block until `gate` yields or disconnects.
        pub(crate) fn gate_next(&self, gate: Receiver<()>) {
            *lock(&self.gate) = Some(gate);
        }

        /// Simulate natural end-of-stream for `voice`.
        pub(crate) fn finish(&self, voice: u64) -> bool {
            match lock(&self.signals).remove(&voice) {
                Some(signal) => {
                    signal.notify();
                    true
                }
                None => false,
            }
        }

        pub(crate) fn live_voices(&self) -> usize {
            lock(&self.signals).len()
        }

        /// Voice number of the most recent successful start for `id`.
        pub(crate) fn voice_for(&self, id: SessionId) -> Option<u64> {
            lock(&self.calls).iter().rev().find_map(|c| match c {
                Call::Start { voice, id: started } if *started == id => Some(*voice),
                _ => None,
            })
        }
    }

    impl AudioEngine for FakeEngine {
        type Handle = FakeHandle;

        fn start(&self, request: &PlayRequest) -> Result<(FakeHandle, Completion), StartError> {
            let gate = lock(&self.gate).take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            if let Some(err) = lock(&self.fail_next).take() {
                return Err(err);
            }
            if request.source().is_none() {
                return Err(StartError::SourceUnavailable("no audio data provided".to_string()));
            }

            let voice = self.next_voice.fetch_add(1, Ordering::Relaxed) + 1;
            let (signal, completion) = Completion::pair();
            lock(&self.signals).insert(voice, signal);
            lock(&self.calls).push(Call::Start { voice, id: request.id });
            Ok((FakeHandle(voice), completion))
        }

        fn pause(&self, handle: &FakeHandle) {
            lock(&self.calls).push(Call::Pause(handle.0));
        }

        fn resume(&self, handle: &FakeHandle) {
            lock(&self.calls).push(Call::Resume(handle.0));
        }

        fn stop(&self, handle: FakeHandle) {
            lock(&self.signals).remove(&handle.0);
            lock(&self.calls).push(Call::Stop(handle.0));
        }
    }
}
