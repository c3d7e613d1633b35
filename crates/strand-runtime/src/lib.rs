//! # strand-runtime
//!
//! Server-side runtime for the strand RPC framework: pattern registry,
//! middleware chain, per-connection session loop, TCP/TLS transport with
//! graceful shutdown, in-band trace-context propagation, and a minimal
//! client.
//!
//! Clients hold one persistent connection and interleave requests (one
//! reply each) with fire-and-forget events. The server dispatches every
//! decoded message to the handler registered under its pattern, runs the
//! configured middleware around it, enforces the per-request deadline, and
//! writes replies back in arrival order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rmpv::Value;
//! use strand_config::ServerConfig;
//! use strand_runtime::{Registry, Result, RpcServer};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<()> {
//! let mut registry = Registry::new();
//! registry.register_request_fn("math.add", |data: Value| async move {
//!     let entries = data.as_map().cloned().unwrap_or_default();
//!     let field = |name: &str| {
//!         entries
//!             .iter()
//!             .find(|(k, _)| k.as_str() == Some(name))
//!             .and_then(|(_, v)| v.as_i64())
//!             .unwrap_or(0)
//!     };
//!     Ok(Value::from(field("a") + field("b")))
//! });
//!
//! let server = RpcServer::new(ServerConfig::new("127.0.0.1:7070"), registry);
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **O(1) dispatch**: pattern lookup over FxHash maps, handlers erased
//!   once at registration
//! - **Typed or dynamic handlers**: Serde-typed [`Handler`] impls or async
//!   closures over raw MessagePack values
//! - **Middleware**: composable before/after/on_error chain, global and
//!   per-pattern
//! - **Fault isolation**: handler failures and timeouts become error
//!   replies, never session or server faults
//! - **Trace propagation**: W3C `traceparent` carried in-band on message
//!   payloads
//! - **Graceful shutdown**: bounded drain, then force-close

pub mod client;
pub mod controller;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod registry;
pub mod server;
mod session;
pub mod telemetry;
pub mod trace;

pub use client::RpcClient;
pub use controller::{export, export_default, Blueprint, Controller};
pub use error::{Error, Result};
pub use handler::{BoxFuture, Handler, RpcHandler};
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareChain, ValidationMiddleware};
pub use registry::Registry;
pub use server::RpcServer;
pub use telemetry::MetricsCollector;
pub use trace::{DispatchSpan, SpanKind, TraceContext};

pub use strand_wire::{PatternKind, RpcMessage, HEALTH_PATTERN, REPLY_PATTERN, TRACEPARENT_KEY};
