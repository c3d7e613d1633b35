use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rmpv::Value;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strand_runtime::{Handler, Middleware, MiddlewareChain, PatternKind, Registry};

#[derive(Debug, Deserialize)]
struct BenchInput {
    value: i64,
}

#[derive(Debug, Serialize)]
struct BenchOutput {
    result: i64,
}

struct AddHandler;

#[async_trait::async_trait]
impl Handler for AddHandler {
    type Input = BenchInput;
    type Output = BenchOutput;
    type Error = strand_runtime::Error;

    async fn handle(&self, input: Self::Input) -> strand_runtime::Result<Self::Output> {
        Ok(BenchOutput {
            result: input.value + 1,
        })
    }
}

struct PassthroughMiddleware;

#[async_trait::async_trait]
impl Middleware for PassthroughMiddleware {}

fn bench_input() -> Value {
    Value::Map(vec![(Value::from("value"), Value::from(42))])
}

fn handler_dispatch_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("handler_dispatch");

    // Typed handler through the registry
    group.bench_function("typed_handler", |b| {
        let mut registry = Registry::new();
        registry.register_request("add", AddHandler);

        b.to_async(&rt).iter(|| async {
            let result = registry
                .dispatch(black_box("add"), PatternKind::Request, black_box(bench_input()))
                .await;
            black_box(result.unwrap());
        });
    });

    // Dispatch wrapped in a two-stage middleware chain
    group.bench_function("with_middleware_chain", |b| {
        let mut registry = Registry::new();
        registry.register_request("add", AddHandler);
        registry.use_global(Arc::new(PassthroughMiddleware));
        registry.use_for_pattern("add", vec![Arc::new(PassthroughMiddleware)]);

        let handler = registry.lookup("add", PatternKind::Request).unwrap().clone();
        let stack = registry.middleware_for("add");

        b.to_async(&rt).iter(|| {
            let handler = handler.clone();
            let chain = MiddlewareChain::from_stack(stack.clone());
            async move {
                let result = chain
                    .execute(black_box(bench_input()), |value| handler.call(value))
                    .await;
                black_box(result.unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, handler_dispatch_benchmark);
criterion_main!(benches);
