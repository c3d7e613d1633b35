//! Minimal RPC client.
//!
//! One connection, serial calls: enough for demos, tooling, and end-to-end
//! tests. Pooling, reconnection, and call-site retries are deliberately out
//! of scope.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rand::{distributions::Alphanumeric, Rng};
use rmpv::Value;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::debug;

use strand_config::DEFAULT_TIMEOUT_MS;
use strand_wire::{RpcCodec, RpcMessage};

use crate::{Error, Result};

/// Extra client-side wait on top of the server-side deadline, so a
/// server-produced timeout reply still arrives before the guard fires.
const GUARD_GRACE_MS: u64 = 1_000;

pub struct RpcClient {
    framed: Framed<TcpStream, RpcCodec>,
}

impl RpcClient {
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        Ok(Self {
            framed: Framed::new(socket, RpcCodec::default()),
        })
    }

    /// Send a request and await its reply, correlated by a generated id.
    pub async fn request(&mut self, pattern: &str, data: Value) -> Result<Value> {
        self.request_inner(pattern, data, None).await
    }

    /// Send a request carrying a `timeoutMs` override.
    pub async fn request_with_timeout(
        &mut self,
        pattern: &str,
        data: Value,
        timeout_ms: u64,
    ) -> Result<Value> {
        self.request_inner(pattern, data, Some(timeout_ms)).await
    }

    /// Send a fire-and-forget event. No reply is expected or awaited.
    pub async fn notify(&mut self, pattern: &str, data: Value) -> Result<()> {
        self.framed.send(RpcMessage::event(pattern, data)).await?;
        Ok(())
    }

    async fn request_inner(
        &mut self,
        pattern: &str,
        data: Value,
        timeout_ms: Option<u64>,
    ) -> Result<Value> {
        let id = correlation_id();
        let mut message = RpcMessage::request(pattern, data).with_id(id.clone());
        message.timeout_ms = timeout_ms;

        self.framed.send(message).await?;

        let guard = Duration::from_millis(timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS) + GUARD_GRACE_MS);
        tokio::time::timeout(guard, self.await_reply(&id))
            .await
            .map_err(|_| Error::Timeout(guard.as_millis() as u64))?
    }

    async fn await_reply(&mut self, id: &str) -> Result<Value> {
        loop {
            let frame = self
                .framed
                .next()
                .await
                .ok_or(Error::ConnectionClosed)??;

            if frame.is_reply() && frame.id.as_deref() == Some(id) {
                return Ok(frame.data);
            }

            // A reply for someone else on a serial client only happens if
            // the caller abandoned an earlier guard-timed-out request.
            debug!(pattern = %frame.pattern, id = ?frame.id, "discarding unexpected frame");
        }
    }
}

fn correlation_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}
