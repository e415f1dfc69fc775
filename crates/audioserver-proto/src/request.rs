//! Typed control requests carried in envelope payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric playback session id chosen by the client.
pub type SessionId = i64;

/// Action codes understood by the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Play,
    Pause,
    Resume,
    Stop,
}

impl Action {
    /// Map a wire action code; `None` for codes outside 0..=3.
    pub fn from_code(code: i64) -> Option<Self> {
        let action = match code {
            0 => Action::Play,
            1 => Action::Pause,
            2 => Action::Resume,
            3 => Action::Stop,
            _ => return None,
        };
        Some(action)
    }

    pub fn code(self) -> i64 {
        match self {
            Action::Play => 0,
            Action::Pause => 1,
            Action::Resume => 2,
            Action::Stop => 3,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Play => "play",
            Action::Pause => "pause",
            Action::Resume => "resume",
            Action::Stop => "stop",
        };
        f.write_str(name)
    }
}

/// Payload for action 0.
///
/// Zero-valued fields are omitted on encode and defaulted on decode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    #[serde(default, alias = "Id", skip_serializing_if = "is_zero_id")]
    pub id: SessionId,
    /// Codec tag, e.g. `mp3` or `wav`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    /// Server-side file path. Takes precedence over `data` when non-empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Gzip-compressed audio bytes, base64 on the wire.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    /// Base-2 gain exponent.
    #[serde(default, skip_serializing_if = "is_zero_volume")]
    pub volume: i64,
    #[serde(default, rename = "loop", skip_serializing_if = "is_false")]
    pub looping: bool,
}

/// The effective audio source of a [`PlayRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaySource<'a> {
    Path(&'a str),
    /// Gzip-compressed bytes.
    Data(&'a [u8]),
}

impl PlayRequest {
    /// Resolve the source: a non-empty path wins, then non-empty data.
    ///
    /// Returns `None` when neither is present.
    pub fn source(&self) -> Option<PlaySource<'_>> {
        if !self.path.is_empty() {
            Some(PlaySource::Path(&self.path))
        } else if !self.data.is_empty() {
            Some(PlaySource::Data(&self.data))
        } else {
            None
        }
    }
}

impl fmt::Display for PlayRequest {
    /// Log-friendly summary; `data` is reported by length only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{id:{} format:{} path:{} data:{}B volume:{} loop:{}}}",
            self.id,
            self.format,
            self.path,
            self.data.len(),
            self.volume,
            self.looping
        )
    }
}

/// Payload for actions 1-3.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRequest {
    #[serde(default, alias = "Id")]
    pub id: SessionId,
}

impl fmt::Display for IdRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{id:{}}}", self.id)
    }
}

/// A decoded request, keyed by its action.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Play(PlayRequest),
    Pause(IdRequest),
    Resume(IdRequest),
    Stop(IdRequest),
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::Play(_) => Action::Play,
            Request::Pause(_) => Action::Pause,
            Request::Resume(_) => Action::Resume,
            Request::Stop(_) => Action::Stop,
        }
    }

    pub fn id(&self) -> SessionId {
        match self {
            Request::Play(p) => p.id,
            Request::Pause(r) | Request::Resume(r) | Request::Stop(r) => r.id,
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Play(p) => write!(f, "{} {p}", self.action()),
            Request::Pause(r) | Request::Resume(r) | Request::Stop(r) => {
                write!(f, "{} {r}", self.action())
            }
        }
    }
}

fn is_zero_id(v: &SessionId) -> bool {
    *v == 0
}

fn is_zero_volume(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Standard base64 for byte fields; `null` or absent decodes as empty.
pub(crate) mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(Vec::new()),
            Some(s) => STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom),
        }
    }
}
