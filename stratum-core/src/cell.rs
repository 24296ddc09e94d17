//! The atomic primitives every node cell is built from.
//!
//! A node's `State` is read and written through [`StateCell`]; an action's
//! attempt log grows only through [`AttemptLog::append`]. Both give
//! sequentially-consistent snapshots via `parking_lot` locks — cheap enough
//! that readers (the walker, the result-stream snapshotter) never need to
//! coordinate with writers beyond taking the lock.

use parking_lot::{Mutex, RwLock};
use stratum_vault::{Attempt, NodeState, Status};

/// A node's mutable state, shared via `Arc` across the single runner that
/// owns the node and any readers taking snapshots.
#[derive(Debug, Default)]
pub struct StateCell(RwLock<NodeState>);

impl StateCell {
    pub fn new() -> Self {
        Self(RwLock::new(NodeState::not_started()))
    }

    /// A value-copy of the current state.
    pub fn load(&self) -> NodeState {
        self.0.read().clone()
    }

    pub fn status(&self) -> Status {
        self.0.read().status
    }

    /// Transition to `Running`, stamping `start` the first time this is called.
    pub fn start_running(&self, now: chrono::DateTime<chrono::Utc>) {
        let mut guard = self.0.write();
        guard.status = Status::Running;
        if guard.start.is_none() {
            guard.start = Some(now);
        }
    }

    /// Transition to a terminal status, stamping `end`. Once a node is
    /// terminal this must not be called again (invariant 1); callers are
    /// expected to check `is_terminal` themselves before dispatching further
    /// work rather than relying on this to no-op.
    pub fn finish(&self, status: Status, now: chrono::DateTime<chrono::Utc>) {
        debug_assert!(status.is_terminal(), "finish() requires a terminal status");
        let mut guard = self.0.write();
        guard.status = status;
        guard.end = Some(now);
    }

    pub fn is_terminal(&self) -> bool {
        self.0.read().status.is_terminal()
    }
}

/// Append-only log of an action's attempts.
#[derive(Debug, Default)]
pub struct AttemptLog(Mutex<Vec<Attempt>>);

impl AttemptLog {
    pub fn new() -> Self {
        Self(Mutex::new(Vec::new()))
    }

    /// Append a new attempt and return its index.
    pub fn append(&self, attempt: Attempt) -> usize {
        let mut guard = self.0.lock();
        guard.push(attempt);
        guard.len() - 1
    }

    /// Replace the attempt at `index` (used to record its outcome after it started).
    pub fn update(&self, index: usize, attempt: Attempt) {
        let mut guard = self.0.lock();
        guard[index] = attempt;
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A value-copy of the whole log.
    pub fn snapshot(&self) -> Vec<Attempt> {
        self.0.lock().clone()
    }
}
