//! Checks Runner: one-shot gates and the continuous liveness monitor.
//!
//! A one-shot group (Bypass/Pre/Post/Deferred) runs its actions in
//! declaration order and stops at the first failure. The continuous group
//! loops the same sweep with a `Delay` between passes until told to stop or
//! until an action fails permanently, at which point it reports failure to
//! its caller so the block/plan runner can cancel siblings.

use crate::executor;
use crate::metrics::Metrics;
use crate::model::{Checks, ChecksKind};
use crate::notify::Dirty;
use crate::registry::Registry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stratum_vault::{NodeId, ObjectType, Status, StorageVault};
use tokio_util::sync::CancellationToken;

/// Run a one-shot group (Bypass/Pre/Post/Deferred) to completion.
///
/// An empty group stays `NotStarted` and is treated by the caller as
/// non-gating; callers should check [`Checks::is_empty`] before deciding
/// whether to even invoke this.
#[allow(clippy::too_many_arguments)]
pub async fn run_one_shot(
    plan_id: NodeId,
    checks: &Arc<Checks>,
    registry: &Registry,
    vault: &dyn StorageVault,
    notify: &Dirty,
    cancel: CancellationToken,
    default_timeout: Duration,
    metrics: &dyn Metrics,
) -> crate::error::Result<Status> {
    debug_assert_ne!(checks.kind, ChecksKind::Continuous, "use run_continuous for continuous groups");

    if checks.is_empty() {
        return Ok(Status::NotStarted);
    }

    checks.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Checks);
    persist_checks(plan_id, checks, vault, cancel.clone()).await?;
    notify.mark();

    let mut status = Status::Completed;
    for action in &checks.actions {
        if cancel.is_cancelled() {
            status = Status::Stopped;
            break;
        }
        let action_status = executor::run_action(plan_id, action, registry, vault, notify, cancel.clone(), default_timeout, metrics).await?;
        if action_status != Status::Completed {
            status = Status::Failed;
            break;
        }
    }

    checks.state.finish(status, Utc::now());
    metrics.node_stopped(ObjectType::Checks);
    metrics.node_terminal(ObjectType::Checks, status);
    persist_checks(plan_id, checks, vault, cancel).await?;
    notify.mark();
    Ok(status)
}

/// Run the continuous group until `cancel` fires or an action fails
/// permanently. Returns `Status::Failed` on the latter, `Status::Stopped` on
/// the former; an empty group returns `Status::NotStarted` immediately
/// without ever looping.
#[allow(clippy::too_many_arguments)]
pub async fn run_continuous(
    plan_id: NodeId,
    checks: &Arc<Checks>,
    registry: &Registry,
    vault: &dyn StorageVault,
    notify: &Dirty,
    cancel: CancellationToken,
    default_timeout: Duration,
    min_delay: Duration,
    metrics: &dyn Metrics,
) -> crate::error::Result<Status> {
    debug_assert_eq!(checks.kind, ChecksKind::Continuous);

    if checks.is_empty() {
        return Ok(Status::NotStarted);
    }

    checks.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Checks);
    persist_checks(plan_id, checks, vault, cancel.clone()).await?;
    notify.mark();

    let delay = checks.delay.unwrap_or(min_delay).max(min_delay);
    let status = loop {
        if cancel.is_cancelled() {
            break Status::Stopped;
        }

        let mut pass_failed = false;
        for action in &checks.actions {
            if cancel.is_cancelled() {
                break;
            }
            let action_status = executor::run_action(plan_id, action, registry, vault, notify, cancel.clone(), default_timeout, metrics).await?;
            if action_status != Status::Completed {
                pass_failed = true;
                break;
            }
        }

        if pass_failed {
            break Status::Failed;
        }
        if cancel.is_cancelled() {
            break Status::Stopped;
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => break Status::Stopped,
        }
    };

    checks.state.finish(status, Utc::now());
    metrics.node_stopped(ObjectType::Checks);
    metrics.node_terminal(ObjectType::Checks, status);
    persist_checks(plan_id, checks, vault, cancel).await?;
    notify.mark();
    Ok(status)
}

async fn persist_checks(plan_id: NodeId, checks: &Arc<Checks>, vault: &dyn StorageVault, cancel: CancellationToken) -> crate::error::Result<()> {
    vault.update_checks(plan_id, &checks.snapshot(), cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::model::Action;
    use crate::registry::test_support::{Outcome, ScriptedPlugin};

    fn registry_with(name: &str, script: Vec<Outcome>) -> Registry {
        let mut registry = Registry::new();
        registry.register(Arc::new(ScriptedPlugin::new(name, script)));
        registry
    }

    #[tokio::test]
    async fn one_shot_all_pass_completes() {
        let checks = Arc::new(Checks::new(ChecksKind::Pre, vec![Action::new("c1", "ok", serde_json::json!({})), Action::new("c2", "ok", serde_json::json!({}))]));
        let registry = registry_with("ok", vec![Outcome::Success]);
        let vault = stratum_vault::MemoryVault::new();
        let status = run_one_shot(NodeId::new(), &checks, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Completed);
    }

    #[tokio::test]
    async fn one_shot_stops_at_first_failure() {
        let checks = Arc::new(Checks::new(
            ChecksKind::Pre,
            vec![
                Action::new("c1", "bad", serde_json::json!({})),
                Action::new("c2", "ok", serde_json::json!({})),
            ],
        ));
        let mut registry = registry_with("bad", vec![Outcome::Permanent]);
        registry.register(Arc::new(ScriptedPlugin::new("ok", vec![Outcome::Success])));
        let vault = stratum_vault::MemoryVault::new();
        let status = run_one_shot(NodeId::new(), &checks, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Failed);
        assert_eq!(checks.actions[1].state.status(), Status::NotStarted);
    }

    #[tokio::test]
    async fn empty_group_never_starts() {
        let checks = Arc::new(Checks::empty(ChecksKind::Bypass));
        let registry = Registry::new();
        let vault = stratum_vault::MemoryVault::new();
        let status = run_one_shot(NodeId::new(), &checks, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::NotStarted);
    }

    #[tokio::test]
    async fn continuous_fails_permanently_after_some_passes() {
        let checks = Arc::new(Checks::new(ChecksKind::Continuous, vec![Action::new("c1", "flaky", serde_json::json!({}))]).with_delay(Duration::from_millis(5)));
        let registry = registry_with("flaky", vec![Outcome::Success, Outcome::Success, Outcome::Permanent]);
        let vault = stratum_vault::MemoryVault::new();
        let status = run_continuous(
            NodeId::new(),
            &checks,
            &registry,
            &vault,
            &Dirty::none(),
            CancellationToken::new(),
            Duration::from_secs(1),
            Duration::from_millis(1),
            &NoopMetrics,
        )
        .await
        .unwrap();
        assert_eq!(status, Status::Failed);
    }

    #[tokio::test]
    async fn continuous_stops_on_cancellation() {
        let checks = Arc::new(Checks::new(ChecksKind::Continuous, vec![Action::new("c1", "ok", serde_json::json!({}))]).with_delay(Duration::from_millis(200)));
        let registry = registry_with("ok", vec![Outcome::Success]);
        let vault = stratum_vault::MemoryVault::new();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });
        let status = run_continuous(
            NodeId::new(),
            &checks,
            &registry,
            &vault,
            &Dirty::none(),
            cancel,
            Duration::from_secs(1),
            Duration::from_millis(1),
            &NoopMetrics,
        )
        .await
        .unwrap();
        assert_eq!(status, Status::Stopped);
    }
}
