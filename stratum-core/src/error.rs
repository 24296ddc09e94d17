//! Error types for plan validation, scheduling, and execution.
//!
//! [`EngineError`] is the single error type returned by every fallible
//! public function in this crate. It wraps vault errors, registry lookup
//! failures, and timeouts behind the error kinds listed in the
//! specification's error handling design, each carrying a `permanent` bit
//! where that distinction matters to a caller.

use thiserror::Error;

/// Convenience result type using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// All errors the engine can produce.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A plan failed structural validation before submission; nothing was persisted.
    #[error("plan validation failed: {0}")]
    Validation(String),

    /// An action referenced a plugin key that isn't registered.
    #[error("plugin '{0}' is not registered")]
    PluginNotFound(String),

    /// A plugin invocation panicked instead of returning normally.
    #[error("plugin '{plugin}' panicked: {detail}")]
    PluginPanic { plugin: String, detail: String },

    /// An action attempt exceeded its configured timeout.
    #[error("action '{0}' timed out")]
    Timeout(String),

    /// The submission's cancellation token tripped before completion.
    #[error("cancelled")]
    Cancelled,

    /// An internal invariant was violated; treated as fatal to the plan.
    #[error("internal error: {0}")]
    Internal(String),

    /// The storage vault is unreachable or otherwise unable to service a call.
    ///
    /// Per the propagation policy, this is fatal to the whole plan: the plan
    /// transitions to `Failed` with `Reason::Internal` and the result stream
    /// closes with this error.
    #[error("storage vault error: {0}")]
    Storage(#[from] stratum_vault::VaultError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn plugin_panic(plugin: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PluginPanic {
            plugin: plugin.into(),
            detail: detail.into(),
        }
    }
}
