//! Status, error, and attempt types shared by every node kind.
//!
//! These are plain, `Serialize`/`Deserialize` value types — the durable
//! portion of a node. `stratum-core` wraps them in atomic cells; the vault
//! only ever sees value copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a plan-tree node.
///
/// Transitions only ever move forward along:
/// `NotStarted -> Running -> {Completed, Failed, Stopped, Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    NotStarted,
    Running,
    Completed,
    Failed,
    Stopped,
    Skipped,
}

impl Status {
    /// Whether this status is one a node settles into and never leaves.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::NotStarted | Status::Running)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::NotStarted
    }
}

/// A node's mutable state: status plus start/end timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: Status,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl NodeState {
    pub fn not_started() -> Self {
        Self::default()
    }
}

/// Tag identifying which kind of plan-tree node a generic reference addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectType {
    Plan,
    Block,
    Checks,
    Sequence,
    Action,
}

/// Why a plan ended up in a terminal, non-`Completed` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reason {
    #[default]
    None,
    PreCheck,
    Block,
    PostCheck,
    ContCheck,
    Cancelled,
    /// The orchestrator itself failed (e.g. the storage vault became
    /// unreachable mid-run), rather than any check or sequence.
    Internal,
}

/// Opaque error code carried by a structured attempt error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    ValidationFailed,
    PluginNotFound,
    PluginPanic,
    Timeout,
    Cancelled,
    Internal,
    StorageUnavailable,
    StorageConflict,
    /// Any error produced by the plugin itself, as opposed to one the engine synthesizes.
    UserPlugin,
}

/// A structured error recorded on an [`Attempt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    /// If set, the retry loop must not make another attempt.
    pub permanent: bool,
    /// An underlying cause, for chained errors (e.g. a plugin error wrapped by a timeout).
    pub wrapped: Option<Box<ErrorInfo>>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>, permanent: bool) -> Self {
        Self {
            code,
            message: message.into(),
            permanent,
            wrapped: None,
        }
    }

    pub fn permanent(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, true)
    }

    pub fn transient(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, message, false)
    }

    pub fn wrapping(mut self, cause: ErrorInfo) -> Self {
        self.wrapped = Some(Box::new(cause));
        self
    }
}

/// One execution of an action: its request's response or a structured error,
/// plus start/end timestamps. Attempts are append-only; attempt `i` is the
/// `i`-th execution of the owning action, including retries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub resp: Option<serde_json::Value>,
    pub err: Option<ErrorInfo>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl Attempt {
    /// A freshly-started attempt with no outcome recorded yet.
    pub fn started(at: DateTime<Utc>) -> Self {
        Self {
            resp: None,
            err: None,
            start: Some(at),
            end: None,
        }
    }
}
