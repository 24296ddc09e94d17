use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use stratum_core::{Action, Block, Engine, EngineConfig, Plugin, PluginError, Registry, Sequence};
use tokio_util::sync::CancellationToken;

struct Instant;

#[async_trait::async_trait]
impl Plugin for Instant {
    fn name(&self) -> &str {
        "instant"
    }

    async fn execute(&self, req: serde_json::Value, _cancel: CancellationToken) -> Result<serde_json::Value, PluginError> {
        Ok(req)
    }
}

fn submit_and_wait_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("submit plan with one action", |b| {
        b.to_async(&runtime).iter(|| async {
            let mut registry = Registry::new();
            registry.register(Arc::new(Instant));
            let vault = Arc::new(stratum_vault::MemoryVault::new());
            let engine = Engine::new(registry, vault, EngineConfig::default());

            let seq = Sequence::new("s1", vec![Action::new("a", "instant", serde_json::json!({}))]);
            let block = Block::new("b1", vec![seq]);
            let plan = stratum_core::Plan::new("p1", vec![block]);
            let plan_id = plan.id;

            let (_stream, submitted) = engine.submit(black_box(plan));
            submitted.unwrap();
            engine.wait(plan_id).await.unwrap();
        });
    });
}

criterion_group!(benches, submit_and_wait_benchmark);
criterion_main!(benches);
