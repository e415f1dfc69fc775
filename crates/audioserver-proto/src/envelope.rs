//! `{action, payload}` envelope codec.
//!
//! Decoding is two-step: [`decode_envelope`] parses only the outer document, then
//! [`decode_payload`] turns the raw payload into the request type selected by the action.

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::request::{Action, IdRequest, PlayRequest, Request, base64_bytes};

/// Outer message: an action code plus the raw (already base64-decoded) inner document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "is_zero_action")]
    pub action: i64,
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Decode the payload for this envelope's action.
    pub fn request(&self) -> Result<Request, DecodeError> {
        decode_payload(self.action, &self.payload)
    }
}

/// Serialize an envelope to JSON bytes.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(envelope)
}

/// Build and serialize the envelope for a typed request.
pub fn encode_request(request: &Request) -> Result<Vec<u8>, serde_json::Error> {
    let payload = match request {
        Request::Play(p) => serde_json::to_vec(p)?,
        Request::Pause(r) | Request::Resume(r) | Request::Stop(r) => serde_json::to_vec(r)?,
    };
    encode_envelope(&Envelope {
        action: request.action().code(),
        payload,
    })
}

/// Parse the outer envelope only.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::Envelope(e.to_string()))
}

/// Decode `raw` as the request type for `action`.
///
/// Unknown actions fail with [`DecodeError::UnrecognizedAction`] without touching `raw`.
pub fn decode_payload(action: i64, raw: &[u8]) -> Result<Request, DecodeError> {
    let kind = Action::from_code(action).ok_or(DecodeError::UnrecognizedAction(action))?;
    let payload_err = |source| DecodeError::Payload { action, source };
    let request = match kind {
        Action::Play => Request::Play(serde_json::from_slice::<PlayRequest>(raw).map_err(payload_err)?),
        Action::Pause => Request::Pause(serde_json::from_slice::<IdRequest>(raw).map_err(payload_err)?),
        Action::Resume => Request::Resume(serde_json::from_slice::<IdRequest>(raw).map_err(payload_err)?),
        Action::Stop => Request::Stop(serde_json::from_slice::<IdRequest>(raw).map_err(payload_err)?),
    };
    Ok(request)
}

fn is_zero_action(v: &i64) -> bool {
    *v == 0
}
