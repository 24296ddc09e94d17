//! Extensible storage vault trait for custom persistence backends.
//!
//! This module defines the **[`StorageVault`]** trait — the core abstraction
//! a durable backend implements (SQLite, CosmosDB, ...). The scheduler in
//! `stratum-core` only ever talks to this trait; it never knows which
//! concrete backend is behind it.
//!
//! # Contract
//!
//! - `create` durably records the whole structural tree so a later `read`
//!   reconstitutes it exactly (modulo `SubmitTime` normalization — see the
//!   reference [`crate::memory::MemoryVault`] implementation).
//! - `update_*` calls persist only the mutable portion of one node (its
//!   `NodeState`, plus `Attempts` for actions) and must be idempotent:
//!   calling one twice with identical content is a no-op.
//! - The engine calls `update_*` serially per node; implementations do not
//!   need to handle concurrent writes to the same node.
//! - Every operation accepts a [`tokio_util::sync::CancellationToken`]; a
//!   backend that honors cancellation mid-call should return
//!   [`crate::error::VaultError::Cancelled`].
//!
//! # Example
//!
//! ```rust,ignore
//! use stratum_vault::{StorageVault, MemoryVault, SearchFilters};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(plan: stratum_vault::PlanSnapshot) -> stratum_vault::Result<()> {
//! let vault = MemoryVault::new();
//! let token = CancellationToken::new();
//! vault.create(&plan, token.clone()).await?;
//! assert!(vault.exists(plan.id, token.clone()).await?);
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::ids::NodeId;
use crate::snapshot::{ActionSnapshot, BlockSnapshot, ChecksSnapshot, PlanSnapshot, PlanSummary, SequenceSnapshot};
use crate::status::Status;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Filters accepted by [`StorageVault::search`]. All present filters are ANDed together.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub by_ids: Option<Vec<NodeId>>,
    pub by_group_ids: Option<Vec<NodeId>>,
    pub by_status: Option<Vec<Status>>,
    pub by_time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
}

/// Abstract durable store for plan trees.
///
/// Implementations are collaborators: the scheduler consumes only this
/// trait. [`crate::memory::MemoryVault`] is the in-process reference
/// implementation; [`crate::null::NullVault`] is a no-op used for dry runs
/// and benchmarking.
#[async_trait]
pub trait StorageVault: Send + Sync {
    /// Persist a whole plan with its initial state. Fails if the ID already exists.
    async fn create(&self, plan: &PlanSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Whether a plan with this ID has been created.
    async fn exists(&self, id: NodeId, cancel: CancellationToken) -> Result<bool>;

    /// Reconstitute a whole plan tree.
    async fn read(&self, id: NodeId, cancel: CancellationToken) -> Result<PlanSnapshot>;

    /// Remove a plan and all its nodes.
    async fn delete(&self, id: NodeId, cancel: CancellationToken) -> Result<()>;

    /// Newest-first summaries. `limit` of `0` means unbounded.
    async fn list(&self, limit: usize, cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>>;

    /// Newest-first summaries matching `filters`.
    async fn search(&self, filters: SearchFilters, cancel: CancellationToken) -> Result<BoxStream<'static, Result<PlanSummary>>>;

    /// Persist one plan's mutable fields (state, reason). Idempotent.
    async fn update_plan(&self, plan_id: NodeId, plan: &PlanSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Persist one block's mutable fields. Idempotent.
    async fn update_block(&self, plan_id: NodeId, block: &BlockSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Persist one checks group's mutable fields. Idempotent.
    async fn update_checks(&self, plan_id: NodeId, checks: &ChecksSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Persist one sequence's mutable fields. Idempotent.
    async fn update_sequence(&self, plan_id: NodeId, sequence: &SequenceSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Persist one action's mutable fields, including its attempt log. Idempotent.
    async fn update_action(&self, plan_id: NodeId, action: &ActionSnapshot, cancel: CancellationToken) -> Result<()>;

    /// Release any resources held by the backend.
    async fn close(&self) -> Result<()>;
}
