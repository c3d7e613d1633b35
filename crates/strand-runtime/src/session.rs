//! Per-connection session loop.
//!
//! Each accepted connection is driven by one task: read a frame, decode,
//! dispatch, write the reply, repeat. Processing is serial, so replies on a
//! connection always come back in the order the requests arrived. The loop
//! ends on peer close, fatal protocol error, cancellation, or the server's
//! drain signal (checked only between messages, so an in-flight dispatch
//! finishes and its reply is delivered during graceful shutdown).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use strand_wire::{PatternKind, RpcCodec, RpcMessage, WireError};

use crate::middleware::MiddlewareChain;
use crate::registry::Registry;
use crate::telemetry::MetricsCollector;
use crate::trace::{self, DispatchSpan, SpanKind};
use crate::Error;

/// Shared state handed to every session by the server.
#[derive(Clone)]
pub(crate) struct SessionContext {
    pub registry: Arc<Registry>,
    pub metrics: MetricsCollector,
    /// Deadline applied to requests that carry no `timeoutMs`.
    pub default_timeout_ms: u64,
    /// Drain signal: stop reading new messages, finish the current one.
    pub shutdown: CancellationToken,
}

pub(crate) struct Session<IO> {
    framed: Framed<IO, RpcCodec>,
    ctx: SessionContext,
    /// Hard cancellation: fired by protocol faults, broken pipe, or the
    /// server's force-close. Suppresses in-flight replies.
    token: CancellationToken,
    peer: SocketAddr,
}

impl<IO> Session<IO>
where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub(crate) fn new(
        io: IO,
        ctx: SessionContext,
        token: CancellationToken,
        peer: SocketAddr,
    ) -> Self {
        Self {
            framed: Framed::new(io, RpcCodec::default()),
            ctx,
            token,
            peer,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!(peer = %self.peer, "session open");

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = self.ctx.shutdown.cancelled() => {
                    debug!(peer = %self.peer, "session draining");
                    break;
                }
                frame = self.framed.next() => match frame {
                    None => {
                        debug!(peer = %self.peer, "peer closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(peer = %self.peer, error = %e, "protocol error, closing session");
                        self.token.cancel();
                        break;
                    }
                    Some(Ok(message)) => {
                        if !self.handle_message(message).await {
                            break;
                        }
                    }
                }
            }
        }

        debug!(peer = %self.peer, "session closed");
    }

    /// Dispatch one message. Returns `false` when the session must end.
    async fn handle_message(&mut self, message: RpcMessage) -> bool {
        match message.kind {
            PatternKind::Request => self.handle_request(message).await,
            PatternKind::Event => {
                self.handle_event(message).await;
                true
            }
        }
    }

    async fn handle_request(&mut self, message: RpcMessage) -> bool {
        let RpcMessage {
            id,
            pattern,
            mut data,
            timeout_ms,
            ..
        } = message;

        let Some(handler) = self.ctx.registry.lookup(&pattern, PatternKind::Request) else {
            // Deliberate silent drop: the peer is expected to run its own
            // timeout for unknown patterns.
            warn!(peer = %self.peer, pattern = %pattern, "no handler for request pattern");
            return true;
        };
        let handler = handler.clone();

        let span = DispatchSpan::start(&pattern, SpanKind::Server, trace::extract(&data));
        span.inject(&mut data);

        let chain = MiddlewareChain::from_stack(self.ctx.registry.middleware_for(&pattern));
        let timeout_ms = timeout_ms.unwrap_or(self.ctx.default_timeout_ms);
        let deadline = Duration::from_millis(timeout_ms);
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = self.token.cancelled() => None,
            result = tokio::time::timeout(deadline, chain.execute(data, |value| handler.call(value))) => {
                Some(match result {
                    Ok(dispatch_result) => dispatch_result,
                    Err(_elapsed) => Err(Error::Timeout(timeout_ms)),
                })
            }
        };

        // Cancelled mid-dispatch: suppress the reply and end the session.
        let Some(result) = outcome else {
            span.finish_err(&Error::ConnectionClosed);
            return false;
        };

        self.ctx
            .metrics
            .record_dispatch(&pattern, started.elapsed(), result.is_ok());

        let reply = match result {
            Ok(value) => {
                span.finish_ok();
                RpcMessage::reply(id, value)
            }
            Err(err) => {
                let reply = RpcMessage::error_reply(id, &err.reply_message());
                span.finish_err(&err);
                reply
            }
        };

        self.send_reply(reply).await
    }

    async fn handle_event(&mut self, message: RpcMessage) {
        let RpcMessage {
            pattern, mut data, ..
        } = message;

        let Some(handler) = self.ctx.registry.lookup(&pattern, PatternKind::Event) else {
            warn!(peer = %self.peer, pattern = %pattern, "no handler for event pattern");
            return;
        };
        let handler = handler.clone();

        let span = DispatchSpan::start(&pattern, SpanKind::Consumer, trace::extract(&data));
        span.inject(&mut data);

        let chain = MiddlewareChain::from_stack(self.ctx.registry.middleware_for(&pattern));
        let started = Instant::now();

        let outcome = tokio::select! {
            _ = self.token.cancelled() => None,
            result = chain.execute(data, |value| handler.call(value)) => Some(result),
        };

        let Some(result) = outcome else {
            span.finish_err(&Error::ConnectionClosed);
            return;
        };

        self.ctx
            .metrics
            .record_dispatch(&pattern, started.elapsed(), result.is_ok());

        match result {
            Ok(_) => span.finish_ok(),
            Err(err) => {
                // Events produce no reply; failures are logged, never
                // surfaced to the peer.
                warn!(peer = %self.peer, pattern = %pattern, error = %err, "event handler failed");
                span.finish_err(&err);
            }
        }
    }

    /// Write one reply frame. Returns `false` when the session must end.
    async fn send_reply(&mut self, reply: RpcMessage) -> bool {
        match self.framed.send(reply).await {
            Ok(()) => true,
            Err(WireError::Io(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(peer = %self.peer, "peer went away mid-reply");
                self.token.cancel();
                false
            }
            Err(e) => {
                error!(peer = %self.peer, error = %e, "failed to write reply");
                self.token.cancel();
                false
            }
        }
    }
}
