//! Block Runner: entrance delay, bypass, pre/cont/post checks, and a
//! bounded-concurrency pool of sequences.
//!
//! Sequences run under a counting semaphore sized to `Concurrency`, not a
//! fixed thread pool — dispatch stays FIFO in declaration order, and a
//! block whose `failed_count` exceeds `ToleratedFailures` cancels every
//! outstanding sequence and waits for them to settle before marking itself
//! Failed. Continuous checks run in their own task alongside the sequence
//! pool and trigger the same cancellation on permanent failure.

use crate::checks;
use crate::config::EngineConfig;
use crate::metrics::Metrics;
use crate::model::Block;
use crate::notify::Dirty;
use crate::registry::Registry;
use crate::sequence;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stratum_vault::{NodeId, ObjectType, Status, StorageVault};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Result of running one block: its terminal status, plus whether that
/// status (if Failed) was caused by its own ContChecks specifically, so the
/// plan runner can attribute `Reason::ContCheck` instead of the generic
/// `Reason::Block` the way S6 pins it.
pub struct BlockOutcome {
    pub status: Status,
    pub cont_failed: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_block(
    plan_id: NodeId,
    block: &Arc<Block>,
    registry: &Registry,
    vault: Arc<dyn StorageVault>,
    notify: &Dirty,
    cancel: CancellationToken,
    config: &EngineConfig,
    metrics: Arc<dyn Metrics>,
) -> crate::error::Result<BlockOutcome> {
    let span = tracing::info_span!("run_block", block = %block.name, id = %block.id);
    let _enter = span.enter();

    block.state.start_running(Utc::now());
    metrics.node_started(ObjectType::Block);
    persist_block(plan_id, block, vault.as_ref(), cancel.clone()).await?;
    notify.mark();

    sleep_cancellable(block.entrance_delay, &cancel).await;

    if !block.bypass.is_empty() {
        let bypass_status =
            checks::run_one_shot(plan_id, &block.bypass, registry, vault.as_ref(), notify, cancel.clone(), config.default_action_timeout(), metrics.as_ref()).await?;
        if bypass_status == Status::Completed {
            block.state.finish(Status::Skipped, Utc::now());
            metrics.node_stopped(ObjectType::Block);
            persist_block(plan_id, block, vault.as_ref(), cancel).await?;
            notify.mark();
            return Ok(BlockOutcome { status: Status::Skipped, cont_failed: false });
        }
    }

    let mut terminal: Option<Status> = None;
    let mut checks_failed = false;
    let mut cont_failed = false;

    if cancel.is_cancelled() {
        terminal = Some(Status::Stopped);
    }

    if terminal.is_none() && !block.pre.is_empty() {
        let pre_status =
            checks::run_one_shot(plan_id, &block.pre, registry, vault.as_ref(), notify, cancel.clone(), config.default_action_timeout(), metrics.as_ref()).await?;
        if pre_status != Status::Completed {
            checks_failed = true;
            terminal = Some(Status::Failed);
        }
    }

    let mut failed_count = 0usize;
    if terminal.is_none() {
        let (count, body_cont_failed) = run_body(plan_id, block, registry, vault.clone(), notify, cancel.clone(), config, metrics.clone()).await?;
        failed_count = count;
        if body_cont_failed {
            checks_failed = true;
            cont_failed = true;
        }
    }

    if terminal.is_none() && !block.post.is_empty() {
        let post_status =
            checks::run_one_shot(plan_id, &block.post, registry, vault.as_ref(), notify, cancel.clone(), config.default_action_timeout(), metrics.as_ref()).await?;
        if post_status != Status::Completed {
            checks_failed = true;
        }
    }

    if terminal.is_none() {
        sleep_cancellable(block.exit_delay, &cancel).await;
    }

    if !block.deferred.is_empty() {
        let deferred_cancel = CancellationToken::new();
        checks::run_one_shot(plan_id, &block.deferred, registry, vault.as_ref(), notify, deferred_cancel, config.default_action_timeout(), metrics.as_ref()).await?;
    }

    let final_status = terminal.unwrap_or_else(|| {
        if checks_failed || failed_count > block.tolerated_failures {
            Status::Failed
        } else if cancel.is_cancelled() {
            Status::Stopped
        } else {
            Status::Completed
        }
    });

    block.state.finish(final_status, Utc::now());
    metrics.node_stopped(ObjectType::Block);
    persist_block(plan_id, block, vault.as_ref(), cancel).await?;
    notify.mark();
    Ok(BlockOutcome {
        status: final_status,
        cont_failed: cont_failed && final_status == Status::Failed,
    })
}

/// Run ContChecks concurrently with the bounded sequence pool. Returns the
/// number of sequences that did not complete, and whether ContChecks itself
/// failed permanently.
async fn run_body(
    plan_id: NodeId,
    block: &Arc<Block>,
    registry: &Registry,
    vault: Arc<dyn StorageVault>,
    notify: &Dirty,
    work_cancel: CancellationToken,
    config: &EngineConfig,
    metrics: Arc<dyn Metrics>,
) -> crate::error::Result<(usize, bool)> {
    let default_timeout = config.default_action_timeout();
    let min_delay = config.continuous_check_min_delay();

    let cont_done_rx = if !block.cont.is_empty() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let checks = block.cont.clone();
        let registry = registry.clone();
        let vault = vault.clone();
        let cont_cancel = work_cancel.clone();
        let fail_cancel = work_cancel.clone();
        let notify = notify.clone();
        let metrics = metrics.clone();
        tokio::spawn(async move {
            let result = checks::run_continuous(plan_id, &checks, &registry, vault.as_ref(), &notify, cont_cancel, default_timeout, min_delay, metrics.as_ref()).await;
            if let Ok(Status::Failed) = result {
                fail_cancel.cancel();
            }
            let _ = tx.send(result);
        });
        Some(rx)
    } else {
        None
    };

    let semaphore = Arc::new(Semaphore::new(block.concurrency.max(1)));
    let mut join_set: JoinSet<crate::error::Result<Status>> = JoinSet::new();
    let mut pending = block.sequences.clone().into_iter();
    let mut next_seq = pending.next();
    let mut in_flight = 0usize;
    let mut failed_count = 0usize;
    let mut grace_deadline: Option<tokio::time::Instant> = None;

    loop {
        while !work_cancel.is_cancelled() && next_seq.is_some() {
            let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                break;
            };
            let seq = next_seq.take().expect("checked is_some");
            next_seq = pending.next();
            in_flight += 1;

            let registry = registry.clone();
            let vault = vault.clone();
            let seq_cancel = work_cancel.clone();
            let notify = notify.clone();
            let metrics = metrics.clone();
            join_set.spawn(async move {
                let _permit = permit;
                sequence::run_sequence(plan_id, &seq, &registry, vault.as_ref(), &notify, seq_cancel, default_timeout, metrics.as_ref()).await
            });
        }

        if in_flight == 0 {
            break;
        }

        // Once cancellation has happened (our own tolerance breach, our own
        // ContChecks failing, or a parent cancelling us), bound how long we
        // wait for the remaining in-flight sequences to settle instead of
        // hanging on a sequence that never observes the token.
        let joined = if work_cancel.is_cancelled() {
            let deadline = *grace_deadline.get_or_insert_with(|| tokio::time::Instant::now() + config.cancellation_grace());
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    tracing::warn!(block = %block.name, "grace period elapsed waiting for in-flight sequences to stop; abandoning the rest");
                    join_set.abort_all();
                    failed_count += in_flight;
                    break;
                }
            }
        } else {
            join_set.join_next().await
        };

        match joined {
            Some(Ok(Ok(status))) => {
                in_flight -= 1;
                if status != Status::Completed {
                    failed_count += 1;
                }
            }
            Some(Ok(Err(engine_err))) => {
                in_flight -= 1;
                failed_count += 1;
                tracing::error!(error = %engine_err, "sequence runner returned an error");
            }
            Some(Err(join_err)) => {
                in_flight -= 1;
                failed_count += 1;
                tracing::error!(error = %join_err, "sequence task panicked");
            }
            None => break,
        }

        if failed_count > block.tolerated_failures {
            work_cancel.cancel();
        }
    }

    let cont_failed = if let Some(rx) = cont_done_rx {
        work_cancel.cancel();
        match tokio::time::timeout(config.cancellation_grace(), rx).await {
            Ok(Ok(Ok(Status::Failed))) => true,
            Ok(_) => false,
            Err(_) => {
                tracing::warn!(block = %block.name, "grace period elapsed waiting for continuous checks to stop");
                false
            }
        }
    } else {
        false
    };

    Ok((failed_count, cont_failed))
}

async fn sleep_cancellable(duration: Duration, cancel: &CancellationToken) {
    if duration.is_zero() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = cancel.cancelled() => {}
    }
}

async fn persist_block(plan_id: NodeId, block: &Arc<Block>, vault: &dyn StorageVault, cancel: CancellationToken) -> crate::error::Result<()> {
    vault.update_block(plan_id, &block.snapshot(), cancel).await?;
    Ok(())
}
