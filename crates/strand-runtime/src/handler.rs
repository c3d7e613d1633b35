use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use rmpv::Value;
use serde::{de::DeserializeOwned, Serialize};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Core handler abstraction. A typed handler deserializes its input from
/// the message payload and serializes its output back into one; the
/// registry erases both ends so the dispatch path only ever sees
/// MessagePack values.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Input: DeserializeOwned + Send;
    type Output: Serialize + Send;
    type Error: Into<crate::Error>;

    /// Execute the handler with type-safe input.
    async fn handle(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;
}

/// Type-erased dispatch entry. Direct dispatch without re-deserializing at
/// the call site.
trait HandlerEntry: Send + Sync {
    fn dispatch(&self, data: Value) -> BoxFuture<'static, crate::Result<Value>>;
}

struct TypedEntry<H: Handler> {
    handler: Arc<H>,
}

impl<H> HandlerEntry for TypedEntry<H>
where
    H: Handler,
    H::Input: 'static,
    H::Output: 'static,
{
    fn dispatch(&self, data: Value) -> BoxFuture<'static, crate::Result<Value>> {
        let input: H::Input = match rmpv::ext::from_value(data) {
            Ok(input) => input,
            Err(e) => return Box::pin(async move { Err(e.into()) }),
        };

        let handler = self.handler.clone();
        Box::pin(async move {
            let output = handler.handle(input).await.map_err(Into::into)?;
            Ok(rmpv::ext::to_value(output)?)
        })
    }
}

struct FnEntry<F> {
    f: F,
}

impl<F> HandlerEntry for FnEntry<F>
where
    F: Fn(Value) -> BoxFuture<'static, crate::Result<Value>> + Send + Sync,
{
    fn dispatch(&self, data: Value) -> BoxFuture<'static, crate::Result<Value>> {
        (self.f)(data)
    }
}

/// A registered handler, ready to be invoked with a payload value.
#[derive(Clone)]
pub struct RpcHandler(Arc<dyn HandlerEntry>);

impl RpcHandler {
    pub fn from_handler<H>(handler: H) -> Self
    where
        H: Handler,
        H::Input: 'static,
        H::Output: 'static,
    {
        Self(Arc::new(TypedEntry {
            handler: Arc::new(handler),
        }))
    }

    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = crate::Result<Value>> + Send + 'static,
    {
        Self(Arc::new(FnEntry {
            f: move |data| Box::pin(f(data)) as BoxFuture<'static, crate::Result<Value>>,
        }))
    }

    pub fn call(&self, data: Value) -> BoxFuture<'static, crate::Result<Value>> {
        self.0.dispatch(data)
    }
}

impl std::fmt::Debug for RpcHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RpcHandler")
    }
}
