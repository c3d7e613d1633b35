use crate::{Error, Result};
use rmpv::Value;
use std::sync::Arc;

/// Middleware trait for request/response processing around a handler.
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    /// Process the payload before handler execution.
    /// Returns the (possibly modified) payload or an error.
    async fn before(&self, request: Value) -> Result<Value> {
        Ok(request)
    }

    /// Process the result after handler execution.
    async fn after(&self, request: Value, response: Value) -> Result<Value> {
        let _ = request;
        Ok(response)
    }

    /// Handle errors from the handler or downstream middleware. Returning
    /// `Ok` recovers: the value becomes the dispatch result.
    async fn on_error(&self, request: Value, error: Error) -> Result<Value> {
        let _ = request;
        Err(error)
    }
}

/// Ordered middleware execution around a terminal handler. The first
/// middleware added sees the outermost invocation.
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Build a chain from an already-ordered stack, e.g. the registry's
    /// `global ∥ per-pattern` concatenation.
    pub fn from_stack(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self { middlewares }
    }

    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the chain around a handler: `before` phases in order, the
    /// handler, then `after` phases in reverse order, or `on_error` in
    /// reverse order when any stage failed.
    pub async fn execute<F, Fut>(&self, mut request: Value, handler: F) -> Result<Value>
    where
        F: FnOnce(Value) -> Fut,
        Fut: std::future::Future<Output = Result<Value>>,
    {
        for middleware in &self.middlewares {
            request = middleware.before(request).await?;
        }

        let result = handler(request.clone()).await;

        match result {
            Ok(mut response) => {
                for middleware in self.middlewares.iter().rev() {
                    response = middleware.after(request.clone(), response).await?;
                }
                Ok(response)
            }
            Err(error) => {
                let mut current_error = error;
                for middleware in self.middlewares.iter().rev() {
                    match middleware.on_error(request.clone(), current_error).await {
                        Ok(recovery_response) => return Ok(recovery_response),
                        Err(new_error) => current_error = new_error,
                    }
                }
                Err(current_error)
            }
        }
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging middleware - emits payloads at debug level through `tracing`.
pub struct LoggingMiddleware {
    tag: String,
}

impl LoggingMiddleware {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

#[async_trait::async_trait]
impl Middleware for LoggingMiddleware {
    async fn before(&self, request: Value) -> Result<Value> {
        tracing::debug!(tag = %self.tag, request = %request, "request");
        Ok(request)
    }

    async fn after(&self, _request: Value, response: Value) -> Result<Value> {
        tracing::debug!(tag = %self.tag, response = %response, "response");
        Ok(response)
    }

    async fn on_error(&self, _request: Value, error: Error) -> Result<Value> {
        tracing::debug!(tag = %self.tag, error = %error, "error");
        Err(error)
    }
}

/// Validation middleware - requires a map payload carrying the given keys.
pub struct ValidationMiddleware {
    required_keys: Vec<String>,
}

impl ValidationMiddleware {
    pub fn new(required_keys: Vec<String>) -> Self {
        Self { required_keys }
    }
}

#[async_trait::async_trait]
impl Middleware for ValidationMiddleware {
    async fn before(&self, request: Value) -> Result<Value> {
        if let Value::Map(entries) = &request {
            for key in &self.required_keys {
                let present = entries
                    .iter()
                    .any(|(k, _)| k.as_str() == Some(key.as_str()));
                if !present {
                    return Err(Error::Handler(format!("Missing required field: {}", key)));
                }
            }
        }
        Ok(request)
    }
}
