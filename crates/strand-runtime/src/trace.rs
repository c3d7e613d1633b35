//! In-band trace-context propagation.
//!
//! Trace lineage rides on the message payload itself: a map payload may
//! carry a W3C `traceparent` string (`00-<32 hex>-<16 hex>-<2 hex>`). The
//! session extracts it after decode, starts a dispatch span parented by the
//! remote context, and overwrites the key with the new span's ids before
//! the middleware chain runs. Span lifecycle is reported through the
//! `tracing` facade; wiring a subscriber or exporter is the embedder's
//! choice.

use std::sync::OnceLock;
use std::time::Instant;

use regex::Regex;
use rmpv::Value;
use strand_wire::TRACEPARENT_KEY;

use crate::Error;

static TRACEPARENT_RE: OnceLock<Regex> = OnceLock::new();

fn traceparent_re() -> &'static Regex {
    TRACEPARENT_RE.get_or_init(|| {
        Regex::new(r"^([0-9a-f]{2})-([0-9a-f]{32})-([0-9a-f]{16})-([0-9a-f]{2})$")
            .expect("traceparent regex")
    })
}

/// Parsed W3C trace context: trace id, span id, flag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: u128,
    pub span_id: u64,
    pub flags: u8,
}

impl TraceContext {
    /// Parse a `traceparent` header. Returns `None` for anything
    /// syntactically invalid: wrong shape, non-hex, unknown version, or
    /// all-zero ids. Malformed values are ignored, never fatal.
    pub fn parse(header: &str) -> Option<Self> {
        let caps = traceparent_re().captures(header)?;
        if &caps[1] != "00" {
            return None;
        }
        let trace_id = u128::from_str_radix(&caps[2], 16).ok()?;
        let span_id = u64::from_str_radix(&caps[3], 16).ok()?;
        let flags = u8::from_str_radix(&caps[4], 16).ok()?;
        if trace_id == 0 || span_id == 0 {
            return None;
        }
        Some(Self {
            trace_id,
            span_id,
            flags,
        })
    }

    /// Render as a `traceparent` header string.
    pub fn header(&self) -> String {
        format!(
            "00-{:032x}-{:016x}-{:02x}",
            self.trace_id, self.span_id, self.flags
        )
    }
}

/// Span kind, mirroring the two dispatch kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    /// A request dispatch (produces a reply).
    Server,
    /// An event dispatch (fire-and-forget).
    Consumer,
}

impl SpanKind {
    fn as_str(&self) -> &'static str {
        match self {
            SpanKind::Server => "server",
            SpanKind::Consumer => "consumer",
        }
    }
}

/// Extract a remote trace context from a payload, if the payload is a map
/// with a syntactically valid `traceparent` entry.
pub fn extract(data: &Value) -> Option<TraceContext> {
    let entries = data.as_map()?;
    entries
        .iter()
        .find(|(k, _)| k.as_str() == Some(TRACEPARENT_KEY))
        .and_then(|(_, v)| v.as_str())
        .and_then(TraceContext::parse)
}

/// One span per dispatched message, named `rpc.<pattern>`.
pub struct DispatchSpan {
    name: String,
    kind: SpanKind,
    context: TraceContext,
    parent: Option<TraceContext>,
    started: Instant,
}

impl DispatchSpan {
    /// Start a span. With a remote parent the trace id is inherited and a
    /// fresh span id minted; without one, both ids are fresh. Sampled flag
    /// is always set on outbound context.
    pub fn start(pattern: &str, kind: SpanKind, remote: Option<TraceContext>) -> Self {
        let trace_id = remote
            .map(|r| r.trace_id)
            .unwrap_or_else(|| rand::random::<u128>().max(1));
        let context = TraceContext {
            trace_id,
            span_id: rand::random::<u64>().max(1),
            flags: 0x01,
        };
        Self {
            name: format!("rpc.{}", pattern),
            kind,
            context,
            parent: remote,
            started: Instant::now(),
        }
    }

    pub fn context(&self) -> TraceContext {
        self.context
    }

    /// Write this span's context into a map payload, inserting or
    /// overwriting the `traceparent` entry in place. Non-map payloads are
    /// left untouched.
    pub fn inject(&self, data: &mut Value) {
        if let Value::Map(entries) = data {
            let header = Value::from(self.context.header());
            match entries
                .iter_mut()
                .find(|(k, _)| k.as_str() == Some(TRACEPARENT_KEY))
            {
                Some(entry) => entry.1 = header,
                None => entries.push((Value::from(TRACEPARENT_KEY), header)),
            }
        }
    }

    pub fn finish_ok(self) {
        self.finish(None);
    }

    pub fn finish_err(self, error: &Error) {
        self.finish(Some(error));
    }

    /// Terminal step: always runs exactly once, records the outcome and,
    /// on error, the failure message.
    fn finish(self, error: Option<&Error>) {
        let elapsed_us = self.started.elapsed().as_micros() as u64;
        let trace_id = format!("{:032x}", self.context.trace_id);
        let span_id = format!("{:016x}", self.context.span_id);
        let parent_span_id = self.parent.map(|p| format!("{:016x}", p.span_id));
        match error {
            None => tracing::debug!(
                target: "strand::trace",
                span = %self.name,
                kind = self.kind.as_str(),
                trace_id = %trace_id,
                span_id = %span_id,
                parent_span_id = parent_span_id.as_deref(),
                elapsed_us,
                outcome = "success",
                "span end"
            ),
            Some(err) => tracing::debug!(
                target: "strand::trace",
                span = %self.name,
                kind = self.kind.as_str(),
                trace_id = %trace_id,
                span_id = %span_id,
                parent_span_id = parent_span_id.as_deref(),
                elapsed_us,
                outcome = "error",
                error = %err,
                "span end"
            ),
        }
    }
}
