//! Session registry.
//!
//! Maps session ids to live engine voices. Every transition for every id goes through
//! one mutex, so concurrent Create/Pause/Resume/Stop and natural completion for the same
//! id always resolve to some serial order.
//!
//! Lock order is registry, then engine. Engine threads never take the registry lock;
//! completion reaches the registry through a per-session watcher thread.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;

use audio_player::{Completion, StartError};
use audioserver_proto::{PlayRequest, SessionId};
use thiserror::Error;

use crate::engine::AudioEngine;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} already exists")]
    SessionExists(SessionId),
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
}

impl From<StartError> for RegistryError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::UnsupportedFormat(msg) => RegistryError::UnsupportedFormat(msg),
            StartError::SourceUnavailable(msg) => RegistryError::SourceUnavailable(msg),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Playing,
    Paused,
}

struct Session<H> {
    handle: H,
    state: SessionState,
    /// Distinguishes successive sessions that reuse the same id.
    generation: u64,
}

struct Sessions<H> {
    active: HashMap<SessionId, Session<H>>,
    /// Ids whose engine start is in flight.
    starting: HashSet<SessionId>,
    next_generation: u64,
}

/// The synchronized id -> session table.
pub struct Registry<E: AudioEngine> {
    engine: E,
    sessions: Mutex<Sessions<E::Handle>>,
    start_resolved: Condvar,
}

impl<E: AudioEngine> Registry<E> {
    pub fn new(engine: E) -> Arc<Self> {
        Arc::new(Self {
            engine,
            sessions: Mutex::new(Sessions {
                active: HashMap::new(),
                starting: HashSet::new(),
                next_generation: 1,
            }),
            start_resolved: Condvar::new(),
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Start a session for `request.id`.
    ///
    /// The engine is started outside the table lock. While that start is in flight the id
    /// is reserved: another Create for it waits for the outcome, and Pause/Resume/Stop see
    /// no session. A failed start leaves the table untouched.
    pub fn create(self: &Arc<Self>, request: &PlayRequest) -> Result<(), RegistryError> {
        let id = request.id;
        let _pending = self.reserve(id)?;

        let (handle, completion) = self.engine.start(request)?;

        let generation = {
            let mut sessions = self.lock();
            let generation = sessions.next_generation;
            sessions.next_generation += 1;
            sessions.active.insert(
                id,
                Session {
                    handle,
                    state: SessionState::Playing,
                    generation,
                },
            );
            generation
        };

        tracing::info!(
            id,
            format = %request.format,
            looping = request.looping,
            "session started"
        );
        self.watch_completion(id, generation, completion);
        Ok(())
    }

    /// Pause a session. Pausing a paused session is a no-op.
    pub fn pause(&self, id: SessionId) -> Result<(), RegistryError> {
        self.transition(id, SessionState::Paused)
    }

    /// Resume a session. Resuming a playing session is a no-op.
    pub fn resume(&self, id: SessionId) -> Result<(), RegistryError> {
        self.transition(id, SessionState::Playing)
    }

    /// Remove a session and release its voice.
    pub fn stop(&self, id: SessionId) -> Result<(), RegistryError> {
        let session = self
            .lock()
            .active
            .remove(&id)
            .ok_or(RegistryError::SessionNotFound(id))?;
        self.engine.stop(session.handle);
        tracing::info!(id, "session stopped");
        Ok(())
    }

    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.lock().active.get(&id).map(|s| s.state)
    }

    pub fn len(&self) -> usize {
        self.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Sessions<E::Handle>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn reserve(&self, id: SessionId) -> Result<PendingStart<'_, E>, RegistryError> {
        let mut sessions = self.lock();
        loop {
            if sessions.active.contains_key(&id) {
                return Err(RegistryError::SessionExists(id));
            }
            if !sessions.starting.contains(&id) {
                break;
            }
            sessions = self
                .start_resolved
                .wait(sessions)
                .unwrap_or_else(|e| e.into_inner());
        }
        sessions.starting.insert(id);
        Ok(PendingStart { registry: self, id })
    }

    fn transition(&self, id: SessionId, target: SessionState) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        let session = sessions
            .active
            .get_mut(&id)
            .ok_or(RegistryError::SessionNotFound(id))?;
        if session.state == target {
            return Ok(());
        }
        match target {
            SessionState::Paused => self.engine.pause(&session.handle),
            SessionState::Playing => self.engine.resume(&session.handle),
        }
        session.state = target;
        tracing::debug!(id, state = ?target, "session state changed");
        Ok(())
    }

    /// Remove `id` after natural end-of-stream, unless it was already stopped or replaced.
    fn complete(&self, id: SessionId, generation: u64) -> bool {
        let mut sessions = self.lock();
        if sessions.active.get(&id).map(|s| s.generation) != Some(generation) {
            tracing::debug!(id, generation, "stale completion ignored");
            return false;
        }
        sessions.active.remove(&id);
        drop(sessions);
        tracing::info!(id, "session finished");
        true
    }

    fn watch_completion(self: &Arc<Self>, id: SessionId, generation: u64, completion: Completion) {
        let registry: Weak<Self> = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || {
                if completion.wait() {
                    if let Some(registry) = registry.upgrade() {
                        registry.complete(id, generation);
                    }
                }
            });
        if let Err(e) = spawned {
            tracing::error!(id, "spawn completion watcher: {e}");
        }
    }
}

/// Releases an id reservation and wakes waiting creators.
struct PendingStart<'a, E: AudioEngine> {
    registry: &'a Registry<E>,
    id: SessionId,
}

impl<E: AudioEngine> Drop for PendingStart<'_, E> {
    fn drop(&mut self) {
        self.registry.lock().starting.remove(&self.id);
        self.registry.start_resolved.notify_all();
    }
}
