//! A no-op [`StorageVault`] for dry runs and benchmarking.
//!
//! Accepts every write without retaining it and reports every read as
//! [`VaultError::NotFound`]. Useful for measuring scheduler overhead in
//! isolation from any persistence cost.

use crate::error::{Result, VaultError};
use crate::ids::NodeId;
use crate::snapshot::{ActionSnapshot, BlockSnapshot, ChecksSnapshot, PlanSnapshot, PlanSummary, SequenceSnapshot};
use crate::traits::{SearchFilters, StorageVault};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullVault;

impl NullVault {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageVault for NullVault {
    async fn create(&self, _plan: &PlanSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn exists(&self, _id: NodeId, _cancel: CancellationToken) -> Result<bool> {
        Ok(false)
    }

    async fn read(&self, id: NodeId, _cancel: CancellationToken) -> Result<PlanSnapshot> {
        Err(VaultError::NotFound(id.as_uuid()))
    }

    async fn delete(&self, _id: NodeId, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn list(&self, _limit: usize, _cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>> {
        Ok(Box::pin(stream::empty()))
    }

    async fn search(&self, _filters: SearchFilters, _cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>> {
        Ok(Box::pin(stream::empty()))
    }

    async fn update_plan(&self, _plan_id: NodeId, _plan: &PlanSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn update_block(&self, _plan_id: NodeId, _block: &BlockSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn update_checks(&self, _plan_id: NodeId, _checks: &ChecksSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn update_sequence(&self, _plan_id: NodeId, _sequence: &SequenceSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn update_action(&self, _plan_id: NodeId, _action: &ActionSnapshot, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
