//! End-to-end scenario tests (S1-S6) exercising the public `Engine` API
//! against stub plugins, mirroring the scenarios used to validate the
//! scheduler's state-machine semantics.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stratum_core::{
    Action, Block, Checks, ChecksKind, Engine, EngineConfig, Plugin, PluginError, Reason, Registry, Sequence, Status,
};
use stratum_vault::MemoryVault;

#[derive(Clone, Copy)]
enum Step {
    Ok,
    Transient,
    Permanent,
    Sleep(Duration),
}

struct ScriptPlugin {
    name: &'static str,
    script: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptPlugin {
    fn new(name: &'static str, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name,
            script,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, req: serde_json::Value, _cancel: tokio_util::sync::CancellationToken) -> Result<serde_json::Value, PluginError> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.get(i).copied().unwrap_or(Step::Ok) {
            Step::Ok => Ok(req),
            Step::Transient => Err(PluginError::transient(format!("transient #{i}"))),
            Step::Permanent => Err(PluginError::permanent(format!("permanent #{i}"))),
            // Cancellation is detected by the executor racing this call
            // against the same token; a longer sleep than the scenario
            // needs to observe is deterministic and lets that race settle.
            Step::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(req)
            }
        }
    }
}

fn engine(plugins: Vec<Arc<dyn Plugin>>) -> Engine {
    let mut registry = Registry::new();
    for p in plugins {
        registry.register(p);
    }
    Engine::new(registry, Arc::new(MemoryVault::new()), EngineConfig::default())
}

async fn drain(engine: &Engine, plan: stratum_core::Plan) -> stratum_vault::PlanSnapshot {
    let plan_id = plan.id;
    let (mut stream, submitted) = engine.submit(plan);
    submitted.unwrap();
    let mut last = None;
    while let Some(snapshot) = stream.next().await {
        last = Some(snapshot);
    }
    last.unwrap_or_else(|| engine.status(plan_id).expect("plan must have a status"))
}

#[tokio::test]
async fn s1_happy_path() {
    let ok = ScriptPlugin::new("ok", vec![Step::Ok]);
    let e = engine(vec![ok]);

    let seq = Sequence::new(
        "s1",
        vec![Action::new("A", "ok", serde_json::json!({})), Action::new("B", "ok", serde_json::json!({}))],
    );
    let block = Block::new("b1", vec![seq]);
    let plan = stratum_core::Plan::new("p1", vec![block]);

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.state.status, Status::Completed);
    assert_eq!(snapshot.reason, Reason::None);
    let actions = &snapshot.blocks[0].sequences[0].actions;
    assert_eq!(actions.len(), 2);
    for action in actions {
        assert_eq!(action.attempts.len(), 1);
        assert!(action.attempts[0].err.is_none());
    }
}

#[tokio::test]
async fn s2_retry_then_succeed() {
    let flaky = ScriptPlugin::new("flaky", vec![Step::Transient, Step::Transient, Step::Ok]);
    let e = engine(vec![flaky]);

    let action = Action::new("A", "flaky", serde_json::json!({})).with_retries(2);
    let seq = Sequence::new("s1", vec![action]);
    let block = Block::new("b1", vec![seq]);
    let plan = stratum_core::Plan::new("p1", vec![block]);

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.state.status, Status::Completed);
    let action = &snapshot.blocks[0].sequences[0].actions[0];
    assert_eq!(action.attempts.len(), 3);
    assert_eq!(action.state.status, Status::Completed);
}

#[tokio::test]
async fn s3_permanent_failure_tolerated_by_block() {
    let bad = ScriptPlugin::new("bad", vec![Step::Permanent]);
    let ok = ScriptPlugin::new("ok", vec![Step::Ok]);
    let e = engine(vec![bad, ok]);

    let s1 = Sequence::new("s1", vec![Action::new("a", "bad", serde_json::json!({}))]);
    let s2 = Sequence::new("s2", vec![Action::new("a", "ok", serde_json::json!({}))]);
    let block = Block::new("b1", vec![s1, s2]).with_concurrency(2).with_tolerated_failures(1);
    let plan = stratum_core::Plan::new("p1", vec![block]);

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.blocks[0].sequences[0].state.status, Status::Failed);
    assert_eq!(snapshot.blocks[0].sequences[1].state.status, Status::Completed);
    assert_eq!(snapshot.blocks[0].state.status, Status::Completed);
    assert_eq!(snapshot.state.status, Status::Completed);
}

#[tokio::test]
async fn s4_exceeds_tolerated_failures() {
    let bad = ScriptPlugin::new("bad", vec![Step::Permanent]);
    let ok = ScriptPlugin::new("ok", vec![Step::Ok]);
    let e = engine(vec![bad, ok]);

    let s1 = Sequence::new("s1", vec![Action::new("a", "bad", serde_json::json!({}))]);
    let s2 = Sequence::new("s2", vec![Action::new("a", "ok", serde_json::json!({}))]);
    let block = Block::new("b1", vec![s1, s2]).with_concurrency(2).with_tolerated_failures(0);
    let plan = stratum_core::Plan::new("p1", vec![block]);

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.blocks[0].state.status, Status::Failed);
    assert_eq!(snapshot.state.status, Status::Failed);
    assert_eq!(snapshot.reason, Reason::Block);
    let failed_count = snapshot
        .blocks[0]
        .sequences
        .iter()
        .filter(|s| s.state.status != Status::Completed)
        .count();
    assert!(failed_count > 0);
}

#[tokio::test]
async fn s5_pre_check_failure_skips_blocks() {
    let bad = ScriptPlugin::new("bad", vec![Step::Permanent]);
    let ok = ScriptPlugin::new("ok", vec![Step::Ok]);
    let e = engine(vec![bad, ok]);

    let seq = Sequence::new("s1", vec![Action::new("a", "ok", serde_json::json!({}))]);
    let block = Block::new("b1", vec![seq]);
    let plan = stratum_core::Plan::new("p1", vec![block])
        .with_pre(Checks::new(ChecksKind::Pre, vec![Action::new("p", "bad", serde_json::json!({}))]));

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.pre.state.status, Status::Failed);
    assert!(snapshot.blocks.iter().all(|b| b.state.status == Status::NotStarted));
    assert_eq!(snapshot.post.state.status, Status::NotStarted);
    assert_eq!(snapshot.state.status, Status::Failed);
    assert_eq!(snapshot.reason, Reason::PreCheck);
}

#[tokio::test]
async fn s6_continuous_check_fails_mid_run() {
    let cont = ScriptPlugin::new("cont", vec![Step::Ok, Step::Ok, Step::Permanent]);
    let slow = ScriptPlugin::new("slow", vec![Step::Sleep(Duration::from_millis(500))]);
    let e = engine(vec![cont, slow]);

    let seq = Sequence::new("s1", vec![Action::new("a", "slow", serde_json::json!({}))]);
    let block = Block::new("b1", vec![seq]).with_cont(
        Checks::new(ChecksKind::Continuous, vec![Action::new("c", "cont", serde_json::json!({}))]).with_delay(Duration::from_millis(10)),
    );
    let plan = stratum_core::Plan::new("p1", vec![block]);

    let snapshot = drain(&e, plan).await;
    assert_eq!(snapshot.blocks[0].state.status, Status::Failed);
    assert_eq!(snapshot.blocks[0].sequences[0].state.status, Status::Stopped);
    assert_eq!(snapshot.state.status, Status::Failed);
    assert_eq!(snapshot.reason, Reason::ContCheck);
}

#[tokio::test]
async fn stop_cancels_a_running_plan() {
    let slow = ScriptPlugin::new("slow", vec![Step::Sleep(Duration::from_secs(5))]);
    let e = engine(vec![slow]);

    let seq = Sequence::new("s1", vec![Action::new("a", "slow", serde_json::json!({}))]);
    let block = Block::new("b1", vec![seq]);
    let plan = stratum_core::Plan::new("p1", vec![block]);
    let plan_id = plan.id;

    let (mut stream, submitted) = e.submit(plan);
    submitted.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    e.stop(plan_id);

    let mut last = None;
    while let Some(snapshot) = stream.next().await {
        last = Some(snapshot);
    }
    let snapshot = last.unwrap();
    assert_eq!(snapshot.state.status, Status::Stopped);
    assert_eq!(snapshot.reason, Reason::Cancelled);
}
