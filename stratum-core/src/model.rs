//! The plan tree: an immutable shape with per-node mutable state cells.
//!
//! Every node type here is built once by the caller, then wrapped in `Arc`
//! before submission; from that point on the engine is the sole mutator of
//! each node's [`StateCell`] / [`AttemptLog`]. `snapshot()` on each type
//! produces the durable, `Serialize` view the vault and the result stream
//! consume.

use crate::cell::{AttemptLog, StateCell};
use crate::error::{EngineError, Result};
use std::sync::Arc;
use std::time::Duration;
use stratum_vault::{ActionSnapshot, BlockSnapshot, ChecksSnapshot, NodeId, PlanSnapshot, SequenceSnapshot};

/// Whether a [`Checks`] group is a one-shot gate or a looping liveness monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksKind {
    Bypass,
    Pre,
    Continuous,
    Post,
    Deferred,
}

pub struct Action {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub plugin: String,
    pub req: serde_json::Value,
    pub timeout: Option<Duration>,
    pub retries: usize,
    pub state: StateCell,
    pub attempts: AttemptLog,
}

impl Action {
    pub fn new(name: impl Into<String>, plugin: impl Into<String>, req: serde_json::Value) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            descr: String::new(),
            plugin: plugin.into(),
            req,
            timeout: None,
            retries: 0,
            state: StateCell::new(),
            attempts: AttemptLog::new(),
        }
    }

    pub fn with_descr(mut self, descr: impl Into<String>) -> Self {
        self.descr = descr.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    pub fn snapshot(&self) -> ActionSnapshot {
        ActionSnapshot {
            id: self.id,
            name: self.name.clone(),
            descr: self.descr.clone(),
            plugin: self.plugin.clone(),
            req: self.req.clone(),
            timeout: self.timeout,
            retries: self.retries,
            state: self.state.load(),
            attempts: self.attempts.snapshot(),
        }
    }
}

pub struct Sequence {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub state: StateCell,
    pub actions: Vec<Arc<Action>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            descr: String::new(),
            state: StateCell::new(),
            actions: actions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn with_descr(mut self, descr: impl Into<String>) -> Self {
        self.descr = descr.into();
        self
    }

    pub fn snapshot(&self) -> SequenceSnapshot {
        SequenceSnapshot {
            id: self.id,
            name: self.name.clone(),
            descr: self.descr.clone(),
            state: self.state.load(),
            actions: self.actions.iter().map(|a| a.snapshot()).collect(),
        }
    }
}

pub struct Checks {
    pub id: NodeId,
    pub kind: ChecksKind,
    /// Only meaningful for `Continuous` checks.
    pub delay: Option<Duration>,
    pub state: StateCell,
    pub actions: Vec<Arc<Action>>,
}

impl Checks {
    pub fn new(kind: ChecksKind, actions: Vec<Action>) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            delay: None,
            state: StateCell::new(),
            actions: actions.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn empty(kind: ChecksKind) -> Self {
        Self::new(kind, vec![])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn snapshot(&self) -> ChecksSnapshot {
        ChecksSnapshot {
            id: self.id,
            delay: self.delay,
            state: self.state.load(),
            actions: self.actions.iter().map(|a| a.snapshot()).collect(),
        }
    }
}

pub struct Block {
    pub id: NodeId,
    pub name: String,
    pub descr: String,
    pub entrance_delay: Duration,
    pub exit_delay: Duration,
    pub concurrency: usize,
    pub tolerated_failures: usize,
    pub state: StateCell,
    pub bypass: Arc<Checks>,
    pub pre: Arc<Checks>,
    pub cont: Arc<Checks>,
    pub post: Arc<Checks>,
    pub deferred: Arc<Checks>,
    pub sequences: Vec<Arc<Sequence>>,
}

impl Block {
    pub fn new(name: impl Into<String>, sequences: Vec<Sequence>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            descr: String::new(),
            entrance_delay: Duration::ZERO,
            exit_delay: Duration::ZERO,
            concurrency: 1,
            tolerated_failures: 0,
            state: StateCell::new(),
            bypass: Arc::new(Checks::empty(ChecksKind::Bypass)),
            pre: Arc::new(Checks::empty(ChecksKind::Pre)),
            cont: Arc::new(Checks::empty(ChecksKind::Continuous)),
            post: Arc::new(Checks::empty(ChecksKind::Post)),
            deferred: Arc::new(Checks::empty(ChecksKind::Deferred)),
            sequences: sequences.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_tolerated_failures(mut self, n: usize) -> Self {
        self.tolerated_failures = n;
        self
    }

    pub fn with_bypass(mut self, checks: Checks) -> Self {
        self.bypass = Arc::new(checks);
        self
    }

    pub fn with_pre(mut self, checks: Checks) -> Self {
        self.pre = Arc::new(checks);
        self
    }

    pub fn with_cont(mut self, checks: Checks) -> Self {
        self.cont = Arc::new(checks);
        self
    }

    pub fn with_post(mut self, checks: Checks) -> Self {
        self.post = Arc::new(checks);
        self
    }

    pub fn with_deferred(mut self, checks: Checks) -> Self {
        self.deferred = Arc::new(checks);
        self
    }

    pub fn snapshot(&self) -> BlockSnapshot {
        BlockSnapshot {
            id: self.id,
            name: self.name.clone(),
            descr: self.descr.clone(),
            entrance_delay: self.entrance_delay,
            exit_delay: self.exit_delay,
            concurrency: self.concurrency,
            tolerated_failures: self.tolerated_failures,
            state: self.state.load(),
            bypass: self.bypass.snapshot(),
            pre: self.pre.snapshot(),
            cont: self.cont.snapshot(),
            post: self.post.snapshot(),
            deferred: self.deferred.snapshot(),
            sequences: self.sequences.iter().map(|s| s.snapshot()).collect(),
        }
    }
}

pub struct Plan {
    pub id: NodeId,
    pub group_id: NodeId,
    pub name: String,
    pub descr: String,
    pub meta: Vec<u8>,
    pub submit_time: chrono::DateTime<chrono::Utc>,
    pub reason: parking_lot::Mutex<stratum_vault::Reason>,
    pub state: StateCell,
    pub bypass: Arc<Checks>,
    pub pre: Arc<Checks>,
    pub cont: Arc<Checks>,
    pub post: Arc<Checks>,
    pub deferred: Arc<Checks>,
    pub blocks: Vec<Arc<Block>>,
}

impl Plan {
    pub fn new(name: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            id: NodeId::new(),
            group_id: NodeId::new(),
            name: name.into(),
            descr: String::new(),
            meta: vec![],
            submit_time: chrono::Utc::now(),
            reason: parking_lot::Mutex::new(stratum_vault::Reason::None),
            state: StateCell::new(),
            bypass: Arc::new(Checks::empty(ChecksKind::Bypass)),
            pre: Arc::new(Checks::empty(ChecksKind::Pre)),
            cont: Arc::new(Checks::empty(ChecksKind::Continuous)),
            post: Arc::new(Checks::empty(ChecksKind::Post)),
            deferred: Arc::new(Checks::empty(ChecksKind::Deferred)),
            blocks: blocks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn with_group_id(mut self, group_id: NodeId) -> Self {
        self.group_id = group_id;
        self
    }

    pub fn with_bypass(mut self, checks: Checks) -> Self {
        self.bypass = Arc::new(checks);
        self
    }

    pub fn with_pre(mut self, checks: Checks) -> Self {
        self.pre = Arc::new(checks);
        self
    }

    pub fn with_cont(mut self, checks: Checks) -> Self {
        self.cont = Arc::new(checks);
        self
    }

    pub fn with_post(mut self, checks: Checks) -> Self {
        self.post = Arc::new(checks);
        self
    }

    pub fn with_deferred(mut self, checks: Checks) -> Self {
        self.deferred = Arc::new(checks);
        self
    }

    pub fn set_reason(&self, reason: stratum_vault::Reason) {
        *self.reason.lock() = reason;
    }

    pub fn reason(&self) -> stratum_vault::Reason {
        *self.reason.lock()
    }

    pub fn snapshot(&self) -> PlanSnapshot {
        PlanSnapshot {
            id: self.id,
            group_id: self.group_id,
            name: self.name.clone(),
            descr: self.descr.clone(),
            meta: self.meta.clone(),
            submit_time: self.submit_time,
            reason: self.reason(),
            state: self.state.load(),
            bypass: self.bypass.snapshot(),
            pre: self.pre.snapshot(),
            cont: self.cont.snapshot(),
            post: self.post.snapshot(),
            deferred: self.deferred.snapshot(),
            blocks: self.blocks.iter().map(|b| b.snapshot()).collect(),
        }
    }
}

/// Structural validation run before a plan is ever persisted.
///
/// Checked here: non-empty blocks, registered plugin keys, no duplicate
/// IDs, non-negative timeouts/retries (guaranteed by the type system via
/// `Duration`/`usize`, so only duplicate-ID and registry checks do real
/// work), and `Concurrency >= 1`.
pub fn validate(plan: &Plan, registry: &crate::registry::Registry) -> Result<()> {
    if plan.blocks.is_empty() {
        return Err(EngineError::validation("plan must contain at least one block"));
    }

    let mut seen_ids = std::collections::HashSet::new();
    validate_checks(&plan.bypass, &mut seen_ids, registry)?;
    validate_checks(&plan.pre, &mut seen_ids, registry)?;
    validate_checks(&plan.cont, &mut seen_ids, registry)?;
    validate_checks(&plan.post, &mut seen_ids, registry)?;
    validate_checks(&plan.deferred, &mut seen_ids, registry)?;

    if !seen_ids.insert(plan.id) {
        return Err(EngineError::validation(format!("duplicate node id {}", plan.id)));
    }

    for block in &plan.blocks {
        if !seen_ids.insert(block.id) {
            return Err(EngineError::validation(format!("duplicate node id {}", block.id)));
        }
        if block.concurrency == 0 {
            return Err(EngineError::validation(format!("block '{}' concurrency must be >= 1", block.name)));
        }
        for checks in [&block.bypass, &block.pre, &block.cont, &block.post, &block.deferred] {
            validate_checks(checks, &mut seen_ids, registry)?;
        }
        for seq in &block.sequences {
            if !seen_ids.insert(seq.id) {
                return Err(EngineError::validation(format!("duplicate node id {}", seq.id)));
            }
            for action in &seq.actions {
                validate_action(action, &mut seen_ids, registry)?;
            }
        }
    }

    Ok(())
}

fn validate_checks(checks: &Checks, seen_ids: &mut std::collections::HashSet<NodeId>, registry: &crate::registry::Registry) -> Result<()> {
    if !seen_ids.insert(checks.id) {
        return Err(EngineError::validation(format!("duplicate node id {}", checks.id)));
    }
    for action in &checks.actions {
        validate_action(action, seen_ids, registry)?;
    }
    Ok(())
}

fn validate_action(action: &Action, seen_ids: &mut std::collections::HashSet<NodeId>, registry: &crate::registry::Registry) -> Result<()> {
    if !seen_ids.insert(action.id) {
        return Err(EngineError::validation(format!("duplicate node id {}", action.id)));
    }
    let plugin = registry
        .lookup(&action.plugin)
        .ok_or_else(|| EngineError::validation(format!("plugin '{}' is not registered", action.plugin)))?;
    if !plugin.validate_request(&action.req) {
        return Err(EngineError::validation(format!(
            "action '{}' request does not satisfy plugin '{}'",
            action.name, action.plugin
        )));
    }
    Ok(())
}
