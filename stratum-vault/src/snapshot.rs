//! Serializable, durable snapshots of each node kind.
//!
//! A snapshot is exactly the persisted portion of a node: its immutable
//! attributes, its `NodeState`, and (for actions) its attempt log. The live
//! tree in `stratum-core` produces these on demand for persistence and for
//! the result stream; the vault never sees anything else.

use crate::ids::NodeId;
use crate::status::{Attempt, NodeState, Reason};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSnapshot {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub plugin: String,
    pub req: serde_json::Value,
    pub timeout: Option<Duration>,
    pub retries: usize,
    pub state: NodeState,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub state: NodeState,
    pub actions: Vec<ActionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecksSnapshot {
    pub id: NodeId,
    /// Only meaningful for continuous checks.
    pub delay: Option<Duration>,
    pub state: NodeState,
    pub actions: Vec<ActionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSnapshot {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub entrance_delay: Duration,
    pub exit_delay: Duration,
    pub concurrency: usize,
    pub tolerated_failures: usize,
    pub state: NodeState,
    pub bypass: ChecksSnapshot,
    pub pre: ChecksSnapshot,
    pub cont: ChecksSnapshot,
    pub post: ChecksSnapshot,
    pub deferred: ChecksSnapshot,
    pub sequences: Vec<SequenceSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    pub id: NodeId,
    pub group_id: NodeId,
    pub name: String,
    pub descr: String,
    pub meta: Vec<u8>,
    pub submit_time: chrono::DateTime<chrono::Utc>,
    pub reason: Reason,
    pub state: NodeState,
    pub bypass: ChecksSnapshot,
    pub pre: ChecksSnapshot,
    pub cont: ChecksSnapshot,
    pub post: ChecksSnapshot,
    pub deferred: ChecksSnapshot,
    pub blocks: Vec<BlockSnapshot>,
}

/// A cheap summary returned by `list`/`search`, without the full action tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: NodeId,
    pub group_id: NodeId,
    pub name: String,
    pub submit_time: chrono::DateTime<chrono::Utc>,
    pub state: NodeState,
    pub reason: Reason,
}

impl From<&PlanSnapshot> for PlanSummary {
    fn from(p: &PlanSnapshot) -> Self {
        Self {
            id: p.id,
            group_id: p.group_id,
            name: p.name.clone(),
            submit_time: p.submit_time,
            state: p.state.clone(),
            reason: p.reason,
        }
    }
}
