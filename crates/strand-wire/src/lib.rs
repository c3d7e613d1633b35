//! # strand-wire
//!
//! Wire format for the strand RPC framework: the message data model and the
//! length-delimited MessagePack codec that turns a TCP byte stream into a
//! sequence of discrete [`RpcMessage`] values.
//!
//! Every frame on the wire is `[4-byte big-endian length N][N payload
//! bytes]`; every payload is a self-describing MessagePack map with the keys
//! `id` (optional), `pattern`, `data`, `patternType` (0 = request,
//! 1 = event) and `timeoutMs` (optional). Replies travel on the same
//! connection with the reserved pattern `"REPLY"` and are correlated by
//! `id`.
//!
//! ## Quick Start
//!
//! ```rust
//! use strand_wire::{RpcMessage, PatternKind};
//! use rmpv::Value;
//!
//! let message = RpcMessage::request("math.add", Value::Map(vec![
//!     (Value::from("a"), Value::from(5)),
//!     (Value::from("b"), Value::from(3)),
//! ]))
//! .with_id("r1");
//!
//! let bytes = message.encode().unwrap();
//! let decoded = RpcMessage::decode(&bytes).unwrap();
//!
//! assert_eq!(decoded.kind, PatternKind::Request);
//! assert_eq!(decoded.id.as_deref(), Some("r1"));
//! ```

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{RpcCodec, MAX_BUFFER_SIZE, MAX_MESSAGE_SIZE};
pub use error::{Result, WireError};
pub use message::{
    InvalidPatternKind, PatternKind, RpcMessage, HEALTH_PATTERN, REPLY_PATTERN, TRACEPARENT_KEY,
};
