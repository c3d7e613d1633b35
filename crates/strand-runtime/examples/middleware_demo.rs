// Example: Middleware Chain Demonstration
//
// Run with: cargo run --example middleware_demo

use std::sync::Arc;

use rmpv::Value;
use strand_runtime::{
    LoggingMiddleware, Middleware, MiddlewareChain, Result, ValidationMiddleware,
};

// Custom timing middleware
struct TimingMiddleware {
    start: std::time::Instant,
}

impl TimingMiddleware {
    fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for TimingMiddleware {
    async fn before(&self, request: Value) -> Result<Value> {
        println!("  ⏱️  Request started");
        Ok(request)
    }

    async fn after(&self, _request: Value, response: Value) -> Result<Value> {
        println!("  ⏱️  Request completed in {:?}", self.start.elapsed());
        Ok(response)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .init();

    println!("🔗 Middleware Example\n");

    let mut chain = MiddlewareChain::new();
    chain.add(Arc::new(LoggingMiddleware::new("echo")));
    chain.add(Arc::new(ValidationMiddleware::new(vec![
        "message".to_string()
    ])));
    chain.add(Arc::new(TimingMiddleware::new()));

    println!("✅ Chain: logging → validation → timing\n");

    let request = Value::Map(vec![(
        Value::from("message"),
        Value::from("Hello from middleware!"),
    )]);

    let response = chain
        .execute(request, |req| async move {
            let message = req
                .as_map()
                .and_then(|entries| {
                    entries
                        .iter()
                        .find(|(k, _)| k.as_str() == Some("message"))
                        .and_then(|(_, v)| v.as_str())
                })
                .unwrap_or_default();

            Ok(Value::Map(vec![
                (Value::from("echo"), Value::from(message)),
                (Value::from("length"), Value::from(message.len() as u64)),
            ]))
        })
        .await?;

    println!("\n📦 Response: {}", response);

    // A payload missing the required key is rejected by the validation
    // stage before the handler runs.
    let rejected = chain
        .execute(Value::Map(vec![]), |_| async { Ok(Value::Nil) })
        .await;
    println!("❌ Missing field rejected: {}", rejected.unwrap_err());

    Ok(())
}
