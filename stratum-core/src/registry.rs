//! Plugin registry: a name -> executor lookup.
//!
//! The registry's *content* — which plugins exist and what they do — is a
//! collaborator concern outside this crate's scope; what lives here is the
//! lookup/validation contract the Action Executor and plan validation
//! depend on.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stratum_vault::{ErrorCode, ErrorInfo};
use tokio_util::sync::CancellationToken;

/// An error a plugin's `execute` returns, distinct from the engine's own
/// [`crate::error::EngineError`] so plugin authors don't need this crate's
/// full error surface.
#[derive(Debug, Clone)]
pub struct PluginError {
    pub code: ErrorCode,
    pub message: String,
    pub permanent: bool,
}

impl PluginError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::UserPlugin,
            message: message.into(),
            permanent: true,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::UserPlugin,
            message: message.into(),
            permanent: false,
        }
    }
}

impl From<PluginError> for ErrorInfo {
    fn from(e: PluginError) -> Self {
        ErrorInfo::new(e.code, e.message, e.permanent)
    }
}

/// A registered executor: the unit an [`crate::model::Action`] invokes by name.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this plugin is intended for use inside a `Checks` group. Purely
    /// advisory for registry consumers; the engine does not enforce it.
    fn is_check(&self) -> bool {
        false
    }

    /// Cheap, synchronous sanity check on a request before submission. The
    /// default accepts anything; plugins with a fixed request shape should
    /// override this instead of relying on a generic reflection-based check.
    fn validate_request(&self, _req: &serde_json::Value) -> bool {
        true
    }

    /// Zero out fields a display-safe snapshot shouldn't carry. Default is
    /// the identity function; see the design notes on secret scrubbing.
    fn scrub(&self, req: &serde_json::Value) -> serde_json::Value {
        req.clone()
    }

    async fn execute(&self, req: serde_json::Value, cancel: CancellationToken) -> Result<serde_json::Value, PluginError>;
}

/// A simple name -> plugin lookup table.
#[derive(Clone, Default)]
pub struct Registry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> &mut Self {
        self.plugins.insert(plugin.name().to_string(), plugin);
        self
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }
}
