//! Declarative controller registration.
//!
//! A controller groups related handlers as methods on one type. Its
//! [`Blueprint`] is the per-type route table: pattern, dispatch kind,
//! per-pattern middleware, and an unbound method reference for each route.
//! Exporting a blueprint binds every route to a concrete instance and
//! yields a fresh [`Registry`], so two instances of the same controller
//! type never share handler state.
//!
//! ```rust
//! use std::sync::Arc;
//! use rmpv::Value;
//! use strand_runtime::{Blueprint, Controller, Registry, Result};
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! impl Greeter {
//!     async fn greet(self: Arc<Self>, _data: Value) -> Result<Value> {
//!         Ok(Value::from(self.greeting.as_str()))
//!     }
//! }
//!
//! impl Controller for Greeter {
//!     fn blueprint() -> Blueprint<Self> {
//!         Blueprint::new().request("greeter.greet", Greeter::greet)
//!     }
//! }
//!
//! let registry: Registry = Greeter::blueprint().export(Greeter {
//!     greeting: "hello".to_string(),
//! });
//! assert!(registry.has_request("greeter.greet"));
//! ```

use std::future::Future;
use std::sync::Arc;

use rmpv::Value;
use strand_wire::PatternKind;

use crate::handler::RpcHandler;
use crate::middleware::Middleware;
use crate::registry::Registry;
use crate::Result;

/// A type whose handlers are registered declaratively through a blueprint.
pub trait Controller: Send + Sync + Sized + 'static {
    fn blueprint() -> Blueprint<Self>;
}

type BindFn<C> = Box<dyn Fn(&Arc<C>) -> RpcHandler + Send + Sync>;

struct Route<C> {
    pattern: String,
    kind: PatternKind,
    bind: BindFn<C>,
}

/// Route table for a controller type. Routes hold unbound method
/// references; binding happens at export time, per instance.
pub struct Blueprint<C> {
    routes: Vec<Route<C>>,
    middleware: Vec<(String, Vec<Arc<dyn Middleware>>)>,
}

impl<C: Send + Sync + 'static> Blueprint<C> {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middleware: Vec::new(),
        }
    }

    /// Route a request pattern to a method.
    pub fn request<F, Fut>(self, pattern: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.route(pattern, PatternKind::Request, method)
    }

    /// Route an event pattern to a method.
    pub fn event<F, Fut>(self, pattern: impl Into<String>, method: F) -> Self
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.route(pattern, PatternKind::Event, method)
    }

    fn route<F, Fut>(mut self, pattern: impl Into<String>, kind: PatternKind, method: F) -> Self
    where
        F: Fn(Arc<C>, Value) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.routes.push(Route {
            pattern: pattern.into(),
            kind,
            bind: Box::new(move |instance: &Arc<C>| {
                let instance = instance.clone();
                let method = method.clone();
                RpcHandler::from_fn(move |data| method(instance.clone(), data))
            }),
        });
        self
    }

    /// Attach per-pattern middleware to one of this controller's routes.
    pub fn middleware(
        mut self,
        pattern: impl Into<String>,
        middleware: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        self.middleware.push((pattern.into(), middleware));
        self
    }

    /// Bind every route to `instance` and produce a fresh registry.
    pub fn export(self, instance: C) -> Registry {
        self.export_arc(Arc::new(instance))
    }

    /// Bind against an instance shared with the caller.
    pub fn export_arc(self, instance: Arc<C>) -> Registry {
        let mut registry = Registry::new();
        for route in &self.routes {
            let handler = (route.bind)(&instance);
            registry.register_handler(route.pattern.clone(), route.kind, handler);
        }
        for (pattern, middleware) in self.middleware {
            registry.use_for_pattern(pattern, middleware);
        }
        registry
    }
}

impl<C: Send + Sync + 'static> Default for Blueprint<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Export a controller instance into a registry.
pub fn export<C: Controller>(instance: C) -> Registry {
    C::blueprint().export(instance)
}

/// Instantiate and export a controller whose construction takes no
/// arguments.
pub fn export_default<C: Controller + Default>() -> Registry {
    C::blueprint().export(C::default())
}
