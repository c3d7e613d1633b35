use std::fmt;

use rmpv::Value;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Pattern every reply frame carries; never a valid dispatch key.
pub const REPLY_PATTERN: &str = "REPLY";

/// Request pattern answered by every registry out of the box.
pub const HEALTH_PATTERN: &str = "__health__";

/// Payload map key reserved for the W3C trace-context header.
pub const TRACEPARENT_KEY: &str = "traceparent";

/// Dispatch kind of a message: a request expects exactly one reply, an
/// event expects none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum PatternKind {
    Request,
    Event,
}

impl From<PatternKind> for u8 {
    fn from(kind: PatternKind) -> u8 {
        match kind {
            PatternKind::Request => 0,
            PatternKind::Event => 1,
        }
    }
}

impl TryFrom<u8> for PatternKind {
    type Error = InvalidPatternKind;

    fn try_from(raw: u8) -> std::result::Result<Self, InvalidPatternKind> {
        match raw {
            0 => Ok(PatternKind::Request),
            1 => Ok(PatternKind::Event),
            other => Err(InvalidPatternKind(other)),
        }
    }
}

/// Rejection for a wire `patternType` outside {0, 1}.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPatternKind(pub u8);

impl fmt::Display for InvalidPatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid patternType {}", self.0)
    }
}

impl std::error::Error for InvalidPatternKind {}

/// The unit of dispatch, on the wire and in memory.
///
/// Encoded as a self-describing MessagePack map with the keys `id`,
/// `pattern`, `data`, `patternType` and `timeoutMs`. `id` and `timeoutMs`
/// are omitted entirely when absent, never emitted as nil.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcMessage {
    /// Opaque correlation token, echoed verbatim in the reply. Absent on
    /// events and on replies to id-less requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Dispatch key, matched by exact equality.
    pub pattern: String,

    /// Arbitrary payload. A map payload may carry trace context under
    /// [`TRACEPARENT_KEY`].
    pub data: Value,

    #[serde(rename = "patternType")]
    pub kind: PatternKind,

    /// Per-request deadline override in milliseconds. Ignored on events.
    #[serde(rename = "timeoutMs", default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl RpcMessage {
    pub fn request(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            data,
            kind: PatternKind::Request,
            timeout_ms: None,
        }
    }

    pub fn event(pattern: impl Into<String>, data: Value) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            data,
            kind: PatternKind::Event,
            timeout_ms: None,
        }
    }

    /// Reply to a request: `id` echoed as-is, pattern set to the reserved
    /// [`REPLY_PATTERN`]. A handler that produced no value replies nil.
    pub fn reply(id: Option<String>, data: Value) -> Self {
        Self {
            id,
            pattern: REPLY_PATTERN.to_string(),
            data,
            kind: PatternKind::Request,
            timeout_ms: None,
        }
    }

    /// Error reply: `data` is the map `{error: <message>}`.
    pub fn error_reply(id: Option<String>, message: &str) -> Self {
        let data = Value::Map(vec![(Value::from("error"), Value::from(message))]);
        Self::reply(id, data)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn is_reply(&self) -> bool {
        self.pattern == REPLY_PATTERN
    }

    /// Serialize to a MessagePack payload (unframed).
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// Deserialize from a MessagePack payload (unframed).
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(payload)?)
    }
}
