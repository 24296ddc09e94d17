//! In-process reference [`StorageVault`] implementation.
//!
//! Backed by a `parking_lot::RwLock<HashMap<...>>`; useful for tests,
//! benchmarks, and as a template for a real backend. Normalizes
//! `submit_time` to the Unix epoch on `create`, mirroring a quirk real
//! storage backends in this lineage are known to have — callers that
//! round-trip a plan through the vault must tolerate that one field
//! changing (see invariant 5 in the core crate's test suite).

use crate::error::{Result, VaultError};
use crate::ids::NodeId;
use crate::snapshot::{ActionSnapshot, BlockSnapshot, ChecksSnapshot, PlanSnapshot, PlanSummary, SequenceSnapshot};
use crate::traits::{SearchFilters, StorageVault};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use parking_lot::RwLock;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct MemoryVault {
    plans: RwLock<HashMap<uuid::Uuid, PlanSnapshot>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(VaultError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn find_block<'a>(plan: &'a mut PlanSnapshot, id: NodeId) -> Option<&'a mut BlockSnapshot> {
        plan.blocks.iter_mut().find(|b| b.id == id)
    }

    fn find_checks<'a>(plan: &'a mut PlanSnapshot, id: NodeId) -> Option<&'a mut ChecksSnapshot> {
        if plan.bypass.id == id {
            return Some(&mut plan.bypass);
        }
        if plan.pre.id == id {
            return Some(&mut plan.pre);
        }
        if plan.cont.id == id {
            return Some(&mut plan.cont);
        }
        if plan.post.id == id {
            return Some(&mut plan.post);
        }
        if plan.deferred.id == id {
            return Some(&mut plan.deferred);
        }
        for b in plan.blocks.iter_mut() {
            if b.bypass.id == id {
                return Some(&mut b.bypass);
            }
            if b.pre.id == id {
                return Some(&mut b.pre);
            }
            if b.cont.id == id {
                return Some(&mut b.cont);
            }
            if b.post.id == id {
                return Some(&mut b.post);
            }
            if b.deferred.id == id {
                return Some(&mut b.deferred);
            }
        }
        None
    }

    fn find_sequence<'a>(plan: &'a mut PlanSnapshot, id: NodeId) -> Option<&'a mut SequenceSnapshot> {
        plan.blocks
            .iter_mut()
            .flat_map(|b| b.sequences.iter_mut())
            .find(|s| s.id == id)
    }

    fn find_action<'a>(plan: &'a mut PlanSnapshot, id: NodeId) -> Option<&'a mut ActionSnapshot> {
        let all_checks = [
            &mut plan.bypass,
            &mut plan.pre,
            &mut plan.cont,
            &mut plan.post,
            &mut plan.deferred,
        ];
        for checks in all_checks {
            if let Some(a) = checks.actions.iter_mut().find(|a| a.id == id) {
                return Some(a);
            }
        }
        for b in plan.blocks.iter_mut() {
            for checks in [&mut b.bypass, &mut b.pre, &mut b.cont, &mut b.post, &mut b.deferred] {
                if let Some(a) = checks.actions.iter_mut().find(|a| a.id == id) {
                    return Some(a);
                }
            }
            for s in b.sequences.iter_mut() {
                if let Some(a) = s.actions.iter_mut().find(|a| a.id == id) {
                    return Some(a);
                }
            }
        }
        None
    }
}

#[async_trait]
impl StorageVault for MemoryVault {
    async fn create(&self, plan: &PlanSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let id = plan.id.as_uuid();
        if plans.contains_key(&id) {
            return Err(VaultError::AlreadyExists(id));
        }
        let mut stored = plan.clone();
        stored.submit_time = chrono::DateTime::UNIX_EPOCH;
        plans.insert(id, stored);
        Ok(())
    }

    async fn exists(&self, id: NodeId, cancel: CancellationToken) -> Result<bool> {
        Self::check_cancelled(&cancel)?;
        Ok(self.plans.read().contains_key(&id.as_uuid()))
    }

    async fn read(&self, id: NodeId, cancel: CancellationToken) -> Result<PlanSnapshot> {
        Self::check_cancelled(&cancel)?;
        self.plans
            .read()
            .get(&id.as_uuid())
            .cloned()
            .ok_or(VaultError::NotFound(id.as_uuid()))
    }

    async fn delete(&self, id: NodeId, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        self.plans
            .write()
            .remove(&id.as_uuid())
            .map(|_| ())
            .ok_or(VaultError::NotFound(id.as_uuid()))
    }

    async fn list(&self, limit: usize, cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>> {
        Self::check_cancelled(&cancel)?;
        let mut summaries: Vec<PlanSummary> = self.plans.read().values().map(PlanSummary::from).collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        if limit > 0 {
            summaries.truncate(limit);
        }
        Ok(Box::pin(stream::iter(summaries.into_iter().map(Ok))))
    }

    async fn search(&self, filters: SearchFilters, cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>> {
        Self::check_cancelled(&cancel)?;
        let mut summaries: Vec<PlanSummary> = self
            .plans
            .read()
            .values()
            .filter(|p| {
                filters.by_ids.as_ref().map_or(true, |ids| ids.contains(&p.id))
                    && filters.by_group_ids.as_ref().map_or(true, |gids| gids.contains(&p.group_id))
                    && filters.by_status.as_ref().map_or(true, |statuses| statuses.contains(&p.state.status))
                    && filters
                        .by_time_range
                        .as_ref()
                        .map_or(true, |(from, to)| p.submit_time >= *from && p.submit_time <= *to)
            })
            .map(PlanSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(Box::pin(stream::iter(summaries.into_iter().map(Ok))))
    }

    async fn update_plan(&self, plan_id: NodeId, plan: &PlanSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let stored = plans.get_mut(&plan_id.as_uuid()).ok_or(VaultError::NotFound(plan_id.as_uuid()))?;
        stored.state = plan.state.clone();
        stored.reason = plan.reason;
        Ok(())
    }

    async fn update_block(&self, plan_id: NodeId, block: &BlockSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let stored = plans.get_mut(&plan_id.as_uuid()).ok_or(VaultError::NotFound(plan_id.as_uuid()))?;
        let target = Self::find_block(stored, block.id).ok_or(VaultError::NotFound(block.id.as_uuid()))?;
        target.state = block.state.clone();
        Ok(())
    }

    async fn update_checks(&self, plan_id: NodeId, checks: &ChecksSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let stored = plans.get_mut(&plan_id.as_uuid()).ok_or(VaultError::NotFound(plan_id.as_uuid()))?;
        let target = Self::find_checks(stored, checks.id).ok_or(VaultError::NotFound(checks.id.as_uuid()))?;
        target.state = checks.state.clone();
        Ok(())
    }

    async fn update_sequence(&self, plan_id: NodeId, sequence: &SequenceSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let stored = plans.get_mut(&plan_id.as_uuid()).ok_or(VaultError::NotFound(plan_id.as_uuid()))?;
        let target = Self::find_sequence(stored, sequence.id).ok_or(VaultError::NotFound(sequence.id.as_uuid()))?;
        target.state = sequence.state.clone();
        Ok(())
    }

    async fn update_action(&self, plan_id: NodeId, action: &ActionSnapshot, cancel: CancellationToken) -> Result<()> {
        Self::check_cancelled(&cancel)?;
        let mut plans = self.plans.write();
        let stored = plans.get_mut(&plan_id.as_uuid()).ok_or(VaultError::NotFound(plan_id.as_uuid()))?;
        let target = Self::find_action(stored, action.id).ok_or(VaultError::NotFound(action.id.as_uuid()))?;
        target.state = action.state.clone();
        target.attempts = action.attempts.clone();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
