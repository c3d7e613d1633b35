// Example: Calculator RPC Server
//
// Run with: cargo run --example calculator
// Then point a client at 127.0.0.1:7070 and call math.add / math.divide.

use serde::{Deserialize, Serialize};
use strand_config::ServerConfig;
use strand_runtime::{Handler, Registry, Result, RpcServer};

#[derive(Debug, Deserialize)]
struct BinaryOperands {
    a: f64,
    b: f64,
}

#[derive(Debug, Serialize)]
struct OperationResult {
    result: f64,
}

struct AddHandler;

#[async_trait::async_trait]
impl Handler for AddHandler {
    type Input = BinaryOperands;
    type Output = OperationResult;
    type Error = strand_runtime::Error;

    async fn handle(&self, input: Self::Input) -> Result<Self::Output> {
        Ok(OperationResult {
            result: input.a + input.b,
        })
    }
}

struct DivideHandler;

#[async_trait::async_trait]
impl Handler for DivideHandler {
    type Input = BinaryOperands;
    type Output = OperationResult;
    type Error = strand_runtime::Error;

    async fn handle(&self, input: Self::Input) -> Result<Self::Output> {
        if input.b == 0.0 {
            return Err(strand_runtime::Error::Handler(
                "Division by zero".to_string(),
            ));
        }
        Ok(OperationResult {
            result: input.a / input.b,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut registry = Registry::new();
    registry.register_request("math.add", AddHandler);
    registry.register_request("math.divide", DivideHandler);

    let config = ServerConfig::new("127.0.0.1:7070");
    let server = std::sync::Arc::new(RpcServer::new(config, registry));

    let serving = {
        let server = server.clone();
        tokio::spawn(async move { server.serve().await })
    };

    println!("🧮 Calculator server on 127.0.0.1:7070 (Ctrl+C to stop)");
    tokio::signal::ctrl_c().await?;

    server.shutdown().await;
    serving.await.map_err(|e| strand_runtime::Error::Handler(e.to_string()))??;

    Ok(())
}
