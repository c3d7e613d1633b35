use std::future::Future;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use rmpv::Value;
use rustc_hash::FxHashMap;
use strand_wire::{PatternKind, HEALTH_PATTERN};

use crate::handler::{Handler, RpcHandler};
use crate::middleware::Middleware;
use crate::Result;

/// Pattern registry: two handler namespaces (request and event), the
/// ordered global middleware list, and per-pattern middleware. O(1)
/// average-case lookup.
///
/// A registry is populated before the transport starts accepting and is
/// treated as read-only while serving.
pub struct Registry {
    requests: FxHashMap<String, RpcHandler>,
    events: FxHashMap<String, RpcHandler>,
    global_middleware: Vec<Arc<dyn Middleware>>,
    pattern_middleware: FxHashMap<String, Vec<Arc<dyn Middleware>>>,
    started: Instant,
}

impl Registry {
    /// Create a registry with the built-in `__health__` request handler
    /// installed.
    pub fn new() -> Self {
        let mut registry = Self {
            requests: FxHashMap::default(),
            events: FxHashMap::default(),
            global_middleware: Vec::new(),
            pattern_middleware: FxHashMap::default(),
            started: Instant::now(),
        };
        registry.install_health();
        registry
    }

    fn install_health(&mut self) {
        let started = self.started;
        self.register_request_fn(HEALTH_PATTERN, move |_data| async move {
            let timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64;
            Ok(Value::Map(vec![
                (Value::from("status"), Value::from("ok")),
                (Value::from("timestamp"), Value::from(timestamp)),
                (Value::from("uptime"), Value::from(started.elapsed().as_secs())),
            ]))
        });
    }

    /// Register a typed request handler. Last registration wins.
    pub fn register_request<H>(&mut self, pattern: impl Into<String>, handler: H)
    where
        H: Handler,
        H::Input: 'static,
        H::Output: 'static,
    {
        self.requests
            .insert(pattern.into(), RpcHandler::from_handler(handler));
    }

    /// Register a typed event handler. Last registration wins.
    pub fn register_event<H>(&mut self, pattern: impl Into<String>, handler: H)
    where
        H: Handler,
        H::Input: 'static,
        H::Output: 'static,
    {
        self.events
            .insert(pattern.into(), RpcHandler::from_handler(handler));
    }

    /// Register an async closure as a request handler.
    pub fn register_request_fn<F, Fut>(&mut self, pattern: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.requests
            .insert(pattern.into(), RpcHandler::from_fn(f));
    }

    /// Register an async closure as an event handler.
    pub fn register_event_fn<F, Fut>(&mut self, pattern: impl Into<String>, f: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.events.insert(pattern.into(), RpcHandler::from_fn(f));
    }

    /// Register an already-erased handler under a pattern. Used by the
    /// controller adapter when binding blueprint routes.
    pub fn register_handler(
        &mut self,
        pattern: impl Into<String>,
        kind: PatternKind,
        handler: RpcHandler,
    ) {
        match kind {
            PatternKind::Request => self.requests.insert(pattern.into(), handler),
            PatternKind::Event => self.events.insert(pattern.into(), handler),
        };
    }

    /// Append middleware to the global list; execution order is
    /// registration order, outermost first.
    pub fn use_global(&mut self, middleware: Arc<dyn Middleware>) {
        self.global_middleware.push(middleware);
    }

    /// Replace the per-pattern middleware list for `pattern`. Overwrite is
    /// the contract, not append.
    pub fn use_for_pattern(
        &mut self,
        pattern: impl Into<String>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) {
        self.pattern_middleware.insert(pattern.into(), middleware);
    }

    pub fn lookup(&self, pattern: &str, kind: PatternKind) -> Option<&RpcHandler> {
        match kind {
            PatternKind::Request => self.requests.get(pattern),
            PatternKind::Event => self.events.get(pattern),
        }
    }

    /// Dispatch a payload to the handler registered under `(pattern,
    /// kind)`, without middleware.
    pub async fn dispatch(&self, pattern: &str, kind: PatternKind, data: Value) -> Result<Value> {
        match self.lookup(pattern, kind) {
            Some(handler) => handler.call(data).await,
            None => Err(crate::Error::PatternNotFound(pattern.to_string())),
        }
    }

    pub fn has_request(&self, pattern: &str) -> bool {
        self.requests.contains_key(pattern)
    }

    pub fn has_event(&self, pattern: &str) -> bool {
        self.events.contains_key(pattern)
    }

    /// The middleware stack for `pattern`: global middleware followed by
    /// the per-pattern list.
    pub fn middleware_for(&self, pattern: &str) -> Vec<Arc<dyn Middleware>> {
        let mut stack = self.global_middleware.clone();
        if let Some(per_pattern) = self.pattern_middleware.get(pattern) {
            stack.extend(per_pattern.iter().cloned());
        }
        stack
    }

    /// Merge another registry's handler maps into this one, later-wins on
    /// collisions. Middleware (global and per-pattern) is not transferred.
    pub fn merge(&mut self, other: Registry) {
        self.requests.extend(other.requests);
        self.events.extend(other.events);
    }

    /// Number of registered handlers across both namespaces.
    pub fn len(&self) -> usize {
        self.requests.len() + self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.events.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
