//! Plan Runner & Orchestrator.
//!
//! [`Engine`] is the library's single entry point: validate, persist, run
//! the nine-step pipeline of plan-level checks and blocks, and stream every
//! observed state transition back to the caller as plan snapshots.

use crate::block;
use crate::checks;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::model::{self, Plan};
use crate::notify::Dirty;
use crate::registry::Registry;
use chrono::Utc;
use futures::Stream;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use stratum_vault::{NodeId, ObjectType, PlanSnapshot, Reason, Status, StorageVault};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// A lazy stream of plan snapshots, one per observed state transition,
/// deduplicated against the previous emission. Closes when the plan reaches
/// a terminal status and the orchestrator drops its sender.
pub struct ResultStream {
    rx: watch::Receiver<Option<PlanSnapshot>>,
}

impl Stream for ResultStream {
    type Item = PlanSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.rx.has_changed() {
                Ok(true) => match this.rx.borrow_and_update().clone() {
                    Some(snapshot) => return Poll::Ready(Some(snapshot)),
                    None => continue,
                },
                Ok(false) => {
                    let fut = this.rx.changed();
                    tokio::pin!(fut);
                    match fut.poll(cx) {
                        Poll::Ready(Ok(())) => continue,
                        Poll::Ready(Err(_)) => return Poll::Ready(None),
                        Poll::Pending => return Poll::Pending,
                    }
                }
                Err(_) => return Poll::Ready(None),
            }
        }
    }
}

struct PlanHandle {
    cancel: CancellationToken,
    status_rx: watch::Receiver<Option<PlanSnapshot>>,
}

/// The engine: owns a plugin registry, a storage vault, and configuration;
/// runs plans and tracks them by ID until their result stream closes.
pub struct Engine {
    registry: Arc<Registry>,
    vault: Arc<dyn StorageVault>,
    config: EngineConfig,
    metrics: Arc<dyn Metrics>,
    handles: SyncMutex<HashMap<NodeId, PlanHandle>>,
}

impl Engine {
    pub fn new(registry: Registry, vault: Arc<dyn StorageVault>, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            vault,
            config,
            metrics: Arc::new(crate::metrics::TracingMetrics),
            handles: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Validate and submit a plan. On validation failure, nothing is
    /// persisted and `Err` is returned alongside a stream that closes
    /// immediately. On success, the plan is durably created and a
    /// background task drives it to a terminal state while this returns a
    /// live [`ResultStream`].
    pub fn submit(&self, plan: Plan) -> (ResultStream, Result<()>) {
        if let Err(e) = model::validate(&plan, &self.registry) {
            let (_tx, rx) = watch::channel(None);
            return (ResultStream { rx }, Err(e));
        }

        let plan = Arc::new(plan);
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();

        self.handles.lock().insert(
            plan.id,
            PlanHandle {
                cancel: cancel.clone(),
                status_rx: rx.clone(),
            },
        );

        let registry = self.registry.clone();
        let vault = self.vault.clone();
        let config = self.config.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(run_plan(plan, registry, vault, config, metrics, cancel, tx));

        (ResultStream { rx }, Ok(()))
    }

    /// The latest known snapshot of a submitted plan.
    pub fn status(&self, id: NodeId) -> Option<PlanSnapshot> {
        self.handles.lock().get(&id)?.status_rx.borrow().clone()
    }

    /// Request cooperative cancellation of a running plan.
    pub fn stop(&self, id: NodeId) {
        if let Some(handle) = self.handles.lock().get(&id) {
            handle.cancel.cancel();
        }
    }

    /// Wait for a plan to reach a terminal status and return its final snapshot.
    pub async fn wait(&self, id: NodeId) -> Option<PlanSnapshot> {
        let mut rx = self.handles.lock().get(&id)?.status_rx.clone();
        loop {
            if let Some(snapshot) = rx.borrow().as_ref() {
                if snapshot.state.status.is_terminal() {
                    return Some(snapshot.clone());
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

async fn run_plan(
    plan: Arc<Plan>,
    registry: Arc<Registry>,
    vault: Arc<dyn StorageVault>,
    config: EngineConfig,
    metrics: Arc<dyn Metrics>,
    cancel: CancellationToken,
    tx: watch::Sender<Option<PlanSnapshot>>,
) {
    let (dirty_tx, mut dirty_rx) = tokio::sync::mpsc::unbounded_channel();
    let notify = Dirty::new(dirty_tx);

    let emitter_plan = plan.clone();
    let emitter = tokio::spawn(async move {
        let mut last: Option<PlanSnapshot> = None;
        while dirty_rx.recv().await.is_some() {
            let snapshot = emitter_plan.snapshot();
            if last.as_ref() != Some(&snapshot) {
                let done = snapshot.state.status.is_terminal();
                last = Some(snapshot.clone());
                if tx.send(Some(snapshot)).is_err() || done {
                    break;
                }
            }
        }
    });

    if let Err(e) = drive_plan(&plan, &registry, vault.clone(), &notify, cancel.clone(), &config, metrics.clone()).await {
        tracing::error!(error = %e, plan = %plan.id, "plan run failed; failing the plan with Reason::Internal");
        // `drive_plan` may have already driven the plan to a terminal status
        // before the failing step (e.g. `finish_plan`'s own persist call); a
        // node's terminal status must never be overwritten once set.
        if !plan.state.is_terminal() {
            plan.set_reason(Reason::Internal);
            plan.state.finish(Status::Failed, Utc::now());
        }
        if let Err(persist_err) = vault.update_plan(plan.id, &plan.snapshot(), cancel).await {
            tracing::error!(error = %persist_err, plan = %plan.id, "failed to persist the plan after a storage error");
        }
        metrics.node_terminal(ObjectType::Plan, plan.state.status());
    }

    notify.mark();
    drop(notify);
    let _ = emitter.await;
}

/// The nine-step pipeline of §4.7: this runs create, plan-level checks,
/// blocks, and deferred cleanup; validation already happened in `submit`.
async fn drive_plan(
    plan: &Arc<Plan>,
    registry: &Arc<Registry>,
    vault: Arc<dyn StorageVault>,
    notify: &Dirty,
    cancel: CancellationToken,
    config: &EngineConfig,
    metrics: Arc<dyn Metrics>,
) -> Result<()> {
    plan.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Plan);
    vault.create(&plan.snapshot(), cancel.clone()).await.or_else(|e| match e {
        stratum_vault::VaultError::AlreadyExists(_) => Ok(()),
        other => Err(other),
    })?;
    notify.mark();

    let default_timeout = config.default_action_timeout();
    let min_delay = config.continuous_check_min_delay();

    if !plan.bypass.is_empty() {
        let status = checks::run_one_shot(plan.id, &plan.bypass, registry, vault.as_ref(), notify, cancel.clone(), default_timeout, metrics.as_ref()).await?;
        if status == Status::Completed {
            metrics.node_stopped(ObjectType::Plan);
            finish_plan(plan, registry, vault.as_ref(), notify, &cancel, config, Status::Skipped, Reason::None, metrics.as_ref()).await?;
            metrics.node_terminal(ObjectType::Plan, Status::Skipped);
            return Ok(());
        }
    }

    let mut terminal: Option<(Status, Reason)> = None;

    if cancel.is_cancelled() {
        terminal = Some((Status::Stopped, Reason::Cancelled));
    }

    if terminal.is_none() && !plan.pre.is_empty() {
        let status = checks::run_one_shot(plan.id, &plan.pre, registry, vault.as_ref(), notify, cancel.clone(), default_timeout, metrics.as_ref()).await?;
        if status != Status::Completed {
            terminal = Some((Status::Failed, Reason::PreCheck));
        }
    }

    if terminal.is_none() {
        let work_cancel = cancel.child_token();

        let cont_done_rx = if !plan.cont.is_empty() {
            let (done_tx, done_rx) = tokio::sync::oneshot::channel();
            let plan_checks = plan.cont.clone();
            let registry_clone = registry.clone();
            let vault_clone = vault.clone();
            let cont_cancel = work_cancel.clone();
            let fail_cancel = work_cancel.clone();
            let notify_clone = notify.clone();
            let metrics_clone = metrics.clone();
            let plan_id = plan.id;
            tokio::spawn(async move {
                let result = checks::run_continuous(
                    plan_id,
                    &plan_checks,
                    registry_clone.as_ref(),
                    vault_clone.as_ref(),
                    &notify_clone,
                    cont_cancel,
                    default_timeout,
                    min_delay,
                    metrics_clone.as_ref(),
                )
                .await;
                if let Ok(Status::Failed) = result {
                    fail_cancel.cancel();
                }
                let _ = done_tx.send(result);
            });
            Some(done_rx)
        } else {
            None
        };

        let mut block_failed = false;
        let mut block_cont_failed = false;
        for b in &plan.blocks {
            if work_cancel.is_cancelled() {
                break;
            }
            let outcome = block::run_block(plan.id, b, registry, vault.clone(), notify, work_cancel.clone(), config, metrics.clone()).await?;
            metrics.node_terminal(ObjectType::Block, outcome.status);
            if outcome.status == Status::Failed {
                block_failed = true;
                block_cont_failed = outcome.cont_failed;
                work_cancel.cancel();
                break;
            }
        }

        let plan_cont_failed = if let Some(rx) = cont_done_rx {
            work_cancel.cancel();
            // Bound the wait for the plan-level ContChecks task to settle:
            // a never-failing loop only exits once it observes cancellation,
            // but a stuck plugin call could still outlast a reasonable grace
            // window, so give up and treat it as not-failed rather than hang.
            match tokio::time::timeout(config.cancellation_grace(), rx).await {
                Ok(Ok(Ok(Status::Failed))) => true,
                Ok(_) => false,
                Err(_) => {
                    tracing::warn!(plan = %plan.id, "grace period elapsed waiting for plan-level continuous checks to stop");
                    false
                }
            }
        } else {
            false
        };

        if block_failed {
            // A block's own ContChecks failing is attributed the same
            // Reason a plan-level ContCheck failure would get (S6), rather
            // than the generic Block reason used for sequence failures.
            terminal = Some((Status::Failed, if block_cont_failed { Reason::ContCheck } else { Reason::Block }));
        } else if plan_cont_failed {
            terminal = Some((Status::Failed, Reason::ContCheck));
        }
    }

    if terminal.is_none() && !plan.post.is_empty() {
        let status = checks::run_one_shot(plan.id, &plan.post, registry, vault.as_ref(), notify, cancel.clone(), default_timeout, metrics.as_ref()).await?;
        if status != Status::Completed {
            terminal = Some((Status::Failed, Reason::PostCheck));
        }
    }

    let (final_status, reason) = terminal.unwrap_or((Status::Completed, Reason::None));
    metrics.node_stopped(ObjectType::Plan);
    finish_plan(plan, registry, vault.as_ref(), notify, &cancel, config, final_status, reason, metrics.as_ref()).await?;
    metrics.node_terminal(ObjectType::Plan, final_status);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn finish_plan(
    plan: &Arc<Plan>,
    registry: &Registry,
    vault: &dyn StorageVault,
    notify: &Dirty,
    cancel: &CancellationToken,
    config: &EngineConfig,
    final_status: Status,
    reason: Reason,
    metrics: &dyn Metrics,
) -> Result<()> {
    if !plan.deferred.is_empty() {
        let deferred_cancel = CancellationToken::new();
        checks::run_one_shot(plan.id, &plan.deferred, registry, vault, notify, deferred_cancel, config.default_action_timeout(), metrics).await?;
    }

    if cancel.is_cancelled() && reason == Reason::None {
        plan.set_reason(Reason::Cancelled);
    } else {
        plan.set_reason(reason);
    }
    plan.state.finish(final_status, Utc::now());
    vault.update_plan(plan.id, &plan.snapshot(), cancel.clone()).await?;
    notify.mark();
    Ok(())
}
