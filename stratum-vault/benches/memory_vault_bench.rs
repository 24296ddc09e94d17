use criterion::{black_box, criterion_group, criterion_main, Criterion};
use stratum_vault::{ChecksSnapshot, MemoryVault, NodeId, PlanSnapshot, Reason, StorageVault};
use tokio_util::sync::CancellationToken;

fn empty_checks() -> ChecksSnapshot {
    ChecksSnapshot {
        id: NodeId::new(),
        delay: None,
        state: Default::default(),
        actions: vec![],
    }
}

fn sample_plan() -> PlanSnapshot {
    PlanSnapshot {
        id: NodeId::new(),
        group_id: NodeId::new(),
        name: "bench-plan".to_string(),
        descr: String::new(),
        meta: vec![],
        submit_time: chrono::Utc::now(),
        reason: Reason::None,
        state: Default::default(),
        bypass: empty_checks(),
        pre: empty_checks(),
        cont: empty_checks(),
        post: empty_checks(),
        deferred: empty_checks(),
        blocks: vec![],
    }
}

fn create_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("vault create", |b| {
        b.to_async(&runtime).iter(|| async {
            let vault = MemoryVault::new();
            let plan = sample_plan();
            vault.create(black_box(&plan), CancellationToken::new()).await.unwrap();
        });
    });
}

fn read_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("vault read", |b| {
        b.to_async(&runtime).iter(|| async {
            let vault = MemoryVault::new();
            let plan = sample_plan();
            let id = plan.id;
            vault.create(&plan, CancellationToken::new()).await.unwrap();
            vault.read(black_box(id), CancellationToken::new()).await.unwrap();
        });
    });
}

criterion_group!(benches, create_benchmark, read_benchmark);
criterion_main!(benches);
