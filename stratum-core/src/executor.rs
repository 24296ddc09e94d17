//! Action Executor: invokes a registered plugin with per-attempt timeout
//! and retry semantics.
//!
//! `N = action.retries + 1` attempts are available; retries are only spent
//! after a non-permanent error, so a permanent error on the very first
//! attempt yields exactly one [`Attempt`]. Timeout is enforced per attempt,
//! never cumulatively.

use crate::cell::AttemptLog;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::Action;
use crate::notify::Dirty;
use crate::registry::Registry;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stratum_vault::{Attempt, ErrorCode, ErrorInfo, NodeId, ObjectType, Status, StorageVault};
use tokio_util::sync::CancellationToken;

enum Outcome {
    Success(serde_json::Value),
    PluginErr(ErrorInfo),
    TimedOut,
    Cancelled,
    Panicked(String),
}

/// Run one action to a terminal status, persisting every attempt as it's
/// started and as it settles.
#[allow(clippy::too_many_arguments)]
pub async fn run_action(
    plan_id: NodeId,
    action: &Arc<Action>,
    registry: &Registry,
    vault: &dyn StorageVault,
    notify: &Dirty,
    cancel: CancellationToken,
    default_timeout: Duration,
    metrics: &dyn Metrics,
) -> Result<Status> {
    let span = tracing::info_span!("run_action", action = %action.name, id = %action.id);
    let _enter = span.enter();

    action.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Action);

    let max_attempts = action.retries + 1;
    let mut status = Status::Failed;

    for attempt_index in 0..max_attempts {
        if cancel.is_cancelled() {
            status = Status::Stopped;
            break;
        }

        let start = Utc::now();
        let idx = record_started(&action.attempts, start);
        persist_action(plan_id, action, vault, cancel.clone()).await?;
        notify.mark();

        let Some(plugin) = registry.lookup(&action.plugin) else {
            let err = ErrorInfo::permanent(ErrorCode::PluginNotFound, format!("plugin '{}' is not registered", action.plugin));
            action.attempts.update(idx, Attempt { resp: None, err: Some(err), start: Some(start), end: Some(Utc::now()) });
            persist_action(plan_id, action, vault, cancel.clone()).await?;
            notify.mark();
            status = Status::Failed;
            break;
        };

        let effective_timeout = match action.timeout {
            Some(d) if d.is_zero() => None,
            Some(d) => Some(d),
            None => Some(default_timeout),
        };

        let outcome = invoke(plugin, action.req.clone(), cancel.child_token(), effective_timeout).await;

        let end = Utc::now();
        match outcome {
            Outcome::Success(resp) => {
                action.attempts.update(idx, Attempt { resp: Some(resp), err: None, start: Some(start), end: Some(end) });
                persist_action(plan_id, action, vault, cancel.clone()).await?;
                notify.mark();
                status = Status::Completed;
                break;
            }
            Outcome::PluginErr(err) => {
                let permanent = err.permanent;
                action.attempts.update(idx, Attempt { resp: None, err: Some(err), start: Some(start), end: Some(end) });
                persist_action(plan_id, action, vault, cancel.clone()).await?;
                notify.mark();
                if permanent {
                    status = Status::Failed;
                    break;
                }
                status = Status::Failed;
                tracing::warn!(attempt = attempt_index, "action attempt failed transiently, retrying if budget remains");
            }
            Outcome::TimedOut => {
                let err = ErrorInfo::permanent(ErrorCode::Timeout, "action attempt exceeded its timeout");
                action.attempts.update(idx, Attempt { resp: None, err: Some(err), start: Some(start), end: Some(end) });
                persist_action(plan_id, action, vault, cancel.clone()).await?;
                notify.mark();
                status = Status::Failed;
                break;
            }
            Outcome::Cancelled => {
                let err = ErrorInfo::permanent(ErrorCode::Cancelled, "action attempt cancelled before completion");
                action.attempts.update(idx, Attempt { resp: None, err: Some(err), start: Some(start), end: Some(end) });
                persist_action(plan_id, action, vault, cancel.clone()).await?;
                notify.mark();
                status = Status::Stopped;
                break;
            }
            Outcome::Panicked(detail) => {
                let err = ErrorInfo::permanent(ErrorCode::PluginPanic, detail);
                action.attempts.update(idx, Attempt { resp: None, err: Some(err), start: Some(start), end: Some(end) });
                persist_action(plan_id, action, vault, cancel.clone()).await?;
                notify.mark();
                status = Status::Failed;
                break;
            }
        }
    }

    action.state.finish(status, Utc::now());
    metrics.node_stopped(ObjectType::Action);
    metrics.node_terminal(ObjectType::Action, status);
    persist_action(plan_id, action, vault, cancel).await?;
    notify.mark();
    Ok(status)
}

fn record_started(log: &AttemptLog, at: chrono::DateTime<Utc>) -> usize {
    log.append(Attempt::started(at))
}

async fn invoke(
    plugin: Arc<dyn crate::registry::Plugin>,
    req: serde_json::Value,
    attempt_cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Outcome {
    let task_cancel = attempt_cancel.clone();
    let handle = tokio::spawn(async move { plugin.execute(req, task_cancel).await });
    let abort_handle = handle.abort_handle();
    let cancel_watch = attempt_cancel.clone();

    // Race the spawned plugin call against its own cancellation so a parent
    // cancelling mid-attempt (e.g. a continuous check failing) produces
    // Stopped rather than waiting for the plugin to notice on its own.
    let race = async move {
        tokio::select! {
            joined = handle => Ok(joined),
            _ = cancel_watch.cancelled() => Err(()),
        }
    };

    let raced = match timeout {
        Some(d) => match tokio::time::timeout(d, race).await {
            Ok(r) => r,
            Err(_elapsed) => {
                abort_handle.abort();
                attempt_cancel.cancel();
                return Outcome::TimedOut;
            }
        },
        None => race.await,
    };

    let joined = match raced {
        Ok(joined) => joined,
        Err(()) => {
            abort_handle.abort();
            return Outcome::Cancelled;
        }
    };

    match joined {
        Ok(Ok(resp)) => Outcome::Success(resp),
        Ok(Err(plugin_err)) => Outcome::PluginErr(plugin_err.into()),
        Err(join_err) => Outcome::Panicked(join_err.to_string()),
    }
}

async fn persist_action(plan_id: NodeId, action: &Arc<Action>, vault: &dyn StorageVault, cancel: CancellationToken) -> Result<()> {
    vault.update_action(plan_id, &action.snapshot(), cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::registry::test_support::{Outcome as ScriptOutcome, ScriptedPlugin};
    use std::sync::Arc;
    use stratum_vault::MemoryVault;

    async fn setup(script: Vec<ScriptOutcome>) -> (Arc<Action>, Registry, MemoryVault, NodeId) {
        let action = Arc::new(Action::new("a", "scripted", serde_json::json!({"x": 1})).with_retries(script.len().saturating_sub(1)));
        let mut registry = Registry::new();
        registry.register(Arc::new(ScriptedPlugin::new("scripted", script)));
        let vault = MemoryVault::new();
        let plan_id = NodeId::new();
        (action, registry, vault, plan_id)
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let (action, registry, vault, plan_id) = setup(vec![ScriptOutcome::Success]).await;
        let status = run_action(plan_id, &action, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Completed);
        assert_eq!(action.attempts.len(), 1);
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let (action, registry, vault, plan_id) = setup(vec![ScriptOutcome::Transient, ScriptOutcome::Transient, ScriptOutcome::Success]).await;
        let status = run_action(plan_id, &action, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Completed);
        assert_eq!(action.attempts.len(), 3);
    }

    #[tokio::test]
    async fn permanent_error_stops_after_one_attempt() {
        let (action, registry, vault, plan_id) = setup(vec![ScriptOutcome::Permanent, ScriptOutcome::Success]).await;
        let status = run_action(plan_id, &action, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Failed);
        assert_eq!(action.attempts.len(), 1);
    }

    #[tokio::test]
    async fn unknown_plugin_fails_with_single_attempt() {
        let action = Arc::new(Action::new("a", "missing", serde_json::json!({})));
        let registry = Registry::new();
        let vault = MemoryVault::new();
        let status = run_action(NodeId::new(), &action, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(1), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Failed);
        assert_eq!(action.attempts.len(), 1);
    }

    #[tokio::test]
    async fn timeout_fails_the_attempt() {
        let action = Arc::new(Action::new("a", "scripted", serde_json::json!({})).with_timeout(Duration::from_millis(20)));
        let mut registry = Registry::new();
        registry.register(Arc::new(ScriptedPlugin::new("scripted", vec![ScriptOutcome::Sleep(Duration::from_millis(500))])));
        let vault = MemoryVault::new();
        let status = run_action(NodeId::new(), &action, &registry, &vault, &Dirty::none(), CancellationToken::new(), Duration::from_secs(5), &NoopMetrics)
            .await
            .unwrap();
        assert_eq!(status, Status::Failed);
        let attempts = action.attempts.snapshot();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].err.as_ref().unwrap().code, ErrorCode::Timeout);
    }
}
