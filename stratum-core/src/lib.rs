//! `stratum-core`: the execution scheduler and state machine for
//! hierarchical, checked operational plans.
//!
//! A [`model::Plan`] is a tree of [`model::Block`]s, each holding
//! concurrently-run [`model::Sequence`]s of [`model::Action`]s, plus five
//! kinds of [`model::Checks`] groups (Bypass, Pre, Continuous, Post,
//! Deferred) at both the plan and block level. [`plan::Engine`] is the
//! library's entry point: it validates a plan, persists it to a
//! [`stratum_vault::StorageVault`], drives it through the pipeline
//! described in each runner module, and streams every observed state
//! transition back as a [`stratum_vault::PlanSnapshot`].
//!
//! Module layout mirrors the tree it executes, one runner per level:
//! [`executor`] runs a single action's attempts, [`checks`] runs a checks
//! group (one-shot or continuous), [`sequence`] runs an action list in
//! order, [`block`] runs a bounded-concurrency pool of sequences alongside
//! its checks, and [`plan`] orchestrates the whole thing.

mod block;
mod cell;
mod checks;
mod config;
mod error;
mod executor;
mod metrics;
mod model;
mod notify;
mod plan;
mod registry;
mod sequence;
mod walker;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use metrics::{Metrics, NoopMetrics, TracingMetrics};
pub use model::{validate, Action, Block, Checks, ChecksKind, Plan, Sequence};
pub use notify::Dirty;
pub use plan::{Engine, ResultStream};
pub use registry::{Plugin, PluginError, Registry};
pub use walker::{NodeRef, PlanWalker, WalkItem};

pub use stratum_vault::{
    ActionSnapshot, Attempt, BlockSnapshot, ChecksSnapshot, ErrorCode, ErrorInfo, NodeId, NodeState,
    ObjectType, PlanSnapshot, PlanSummary, Reason, SearchFilters, SequenceSnapshot, Status, StorageVault,
    VaultError,
};
