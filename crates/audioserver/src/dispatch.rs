//! Action dispatch: one decoded envelope becomes one registry operation.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use audioserver_proto::{Action, DecodeError, Envelope, Request};
use thiserror::Error;

use crate::engine::AudioEngine;
use crate::registry::{Registry, RegistryError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct Dispatcher<E: AudioEngine> {
    registry: Arc<Registry<E>>,
}

impl<E: AudioEngine> Clone for Dispatcher<E> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<E: AudioEngine> Dispatcher<E> {
    pub fn new(registry: Arc<Registry<E>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry<E>> {
        &self.registry
    }

    /// Decode the envelope's payload and apply it on the calling thread.
    pub fn handle(&self, envelope: &Envelope) -> Result<Action, DispatchError> {
        let request = envelope.request()?;
        tracing::info!(action = %request.action(), request = %request, "message received");
        match &request {
            Request::Play(play) => self.registry.create(play)?,
            Request::Pause(r) => self.registry.pause(r.id)?,
            Request::Resume(r) => self.registry.resume(r.id)?,
            Request::Stop(r) => self.registry.stop(r.id)?,
        }
        Ok(request.action())
    }

    /// Apply `envelope` on its own thread; failures are logged and dropped.
    pub fn spawn(&self, envelope: Envelope) -> io::Result<JoinHandle<()>> {
        let dispatcher = self.clone();
        thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || dispatcher.handle_logged(&envelope))
    }

    fn handle_logged(&self, envelope: &Envelope) {
        match self.handle(envelope) {
            Ok(_) => {}
            Err(DispatchError::Decode(e)) => {
                tracing::warn!(action = envelope.action, "message dropped: {e}");
            }
            Err(DispatchError::Registry(e)) => {
                tracing::warn!(action = envelope.action, "request failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{Call, FakeEngine};
    use crate::registry::SessionState;
    use audioserver_proto::{IdRequest, PlayRequest, decode_envelope, encode_request};

    fn dispatcher() -> Dispatcher<FakeEngine> {
        Dispatcher::new(Registry::new(FakeEngine::default()))
    }

    fn envelope(request: &Request) -> Envelope {
        decode_envelope(&encode_request(request).unwrap()).unwrap()
    }

    fn play(id: i64) -> Request {
        Request::Play(PlayRequest {
            id,
            format: "mp3".to_string(),
            path: "/music/a.mp3".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn actions_route_to_registry_operations() {
        let d = dispatcher();
        assert_eq!(d.handle(&envelope(&play(1))).unwrap(), Action::Play);
        assert_eq!(
            d.handle(&envelope(&Request::Pause(IdRequest { id: 1 }))).unwrap(),
            Action::Pause
        );
        assert_eq!(d.registry().state(1), Some(SessionState::Paused));
        assert_eq!(
            d.handle(&envelope(&Request::Resume(IdRequest { id: 1 }))).unwrap(),
            Action::Resume
        );
        assert_eq!(d.registry().state(1), Some(SessionState::Playing));
        assert_eq!(
            d.handle(&envelope(&Request::Stop(IdRequest { id: 1 }))).unwrap(),
            Action::Stop
        );
        assert!(d.registry().is_empty());
    }

    #[test]
    fn unrecognized_action_never_reaches_registry() {
        let d = dispatcher();
        let env = Envelope {
            action: 7,
            payload: br#"{"id":1}"#.to_vec(),
        };
        let err = d.handle(&env).unwrap_err();
        assert!(matches!(err, DispatchError::Decode(DecodeError::UnrecognizedAction(7))));
        assert!(d.registry().engine().calls().is_empty());
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let d = dispatcher();
        let env = Envelope {
            action: 1,
            payload: br#"{"id":"one"}"#.to_vec(),
        };
        assert!(matches!(
            d.handle(&env),
            Err(DispatchError::Decode(DecodeError::Payload { action: 1, .. }))
        ));
    }

    #[test]
    fn registry_failures_surface_as_registry_errors() {
        let d = dispatcher();
        let err = d
            .handle(&envelope(&Request::Stop(IdRequest { id: 42 })))
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Registry(RegistryError::SessionNotFound(42))
        ));
    }

    #[test]
    fn spawned_dispatch_runs_off_thread() {
        let d = dispatcher();
        d.spawn(envelope(&play(5))).unwrap().join().unwrap();
        assert_eq!(d.registry().state(5), Some(SessionState::Playing));

        // Failures are swallowed by the worker.
        d.spawn(envelope(&play(5))).unwrap().join().unwrap();
        let starts = d
            .registry()
            .engine()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Start { id: 5, .. }))
            .count();
        assert_eq!(starts, 1);
    }
}
