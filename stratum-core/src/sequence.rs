//! Sequence Runner: ordered execution of an action list.
//!
//! A sequence has no internal concurrency; `Block` is the unit that runs
//! sequences in parallel. On cancellation the sequence stops dispatching new
//! actions and lets the in-flight one observe the same token.

use crate::executor;
use crate::metrics::Metrics;
use crate::model::Sequence;
use crate::notify::Dirty;
use crate::registry::Registry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stratum_vault::{NodeId, ObjectType, Status, StorageVault};
use tokio_util::sync::CancellationToken;

/// Run every action in `sequence` in index order, stopping at the first
/// non-completed terminal status.
#[allow(clippy::too_many_arguments)]
pub async fn run_sequence(
    plan_id: NodeId,
    sequence: &Arc<Sequence>,
    registry: &Registry,
    vault: &dyn StorageVault,
    notify: &Dirty,
    cancel: CancellationToken,
    default_timeout: Duration,
    metrics: &dyn Metrics,
) -> crate::error::Result<Status> {
    let span = tracing::info_span!("run_sequence", sequence = %sequence.name, id = %sequence.id);
    let _enter = span.enter();

    sequence.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Sequence);
    persist_sequence(plan_id, sequence, vault, cancel.clone()).await?;
    notify.mark();

    let mut status = Status::Completed;
    for action in &sequence.actions {
        if cancel.is_cancelled() {
            status = Status::Stopped;
            break;
        }
        let action_status = executor::run_action(plan_id, action, registry, vault, notify, cancel.clone(), default_timeout, metrics).await?;
        match action_status {
            Status::Completed => continue,
            Status::Stopped => {
                status = Status::Stopped;
                break;
            }
            _ => {
                status = Status::Failed;
                break;
            }
        }
    }

    sequence.state.finish(status, Utc::now());
    metrics.node_stopped(ObjectType::Sequence);
    metrics.node_terminal(ObjectType::Sequence, status);
    persist_sequence(plan_id, sequence, vault, cancel).await?;
    notify.mark();
    Ok(status)
}

async fn persist_sequence(plan_id: NodeId, sequence: &Arc<Sequence>, vault: &dyn StorageVault, cancel: CancellationToken) -> crate::error::Result<()> {
    vault.update_sequence(plan_id, &sequence.snapshot(), cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::model::Action;
    use crate::registry::test_support::{Outcome, ScriptedPlugin};
    use std::sync::Arc;

    #[tokio::test]
    async fn all_actions_complete() {
        let seq = Arc::new(Sequence::new("s1", vec![Action::new("a", "ok", serde_json::json!({})), Action::new("b", "ok", serde_json::json!({}))]));
        let mut registry = Registry::new();
        registry.register(Arc::new(ScriptedPlugin::new("ok", vec![Outcome::Success])));
        let vault = stratum_vault::MemoryVault::new();
        let status = run_sequence(NodeId::new(), &seq, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Completed);
    }

    #[tokio::test]
    async fn stops_at_first_permanent_failure() {
        let seq = Arc::new(Sequence::new("s1", vec![Action::new("a", "bad", serde_json::json!({})), Action::new("b", "ok", serde_json::json!({}))]));
        let mut registry = Registry::new();
        registry.register(Arc::new(ScriptedPlugin::new("bad", vec![Outcome::Permanent])));
        registry.register(Arc::new(ScriptedPlugin::new("ok", vec![Outcome::Success])));
        let vault = stratum_vault::MemoryVault::new();
        let status = run_sequence(NodeId::new(), &seq, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Failed);
        assert_eq!(seq.actions[1].state.status(), Status::NotStarted);
    }
}
