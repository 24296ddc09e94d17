//! Observability collaborator: counters the orchestrator drives.
//!
//! The engine doesn't own a metrics backend; it calls into a small
//! [`Metrics`] trait at the points the specification calls out (started /
//! stopped running counts, terminal status counts), keyed by
//! [`ObjectType`]. [`TracingMetrics`] is the default, backend-free
//! implementation — it just emits `tracing` events, so the engine is
//! observable out of the box without wiring in a real metrics exporter.

use stratum_vault::{ObjectType, Status};

pub trait Metrics: Send + Sync {
    /// A node of this type started running.
    fn node_started(&self, object_type: ObjectType);

    /// A node of this type stopped running (about to become terminal).
    fn node_stopped(&self, object_type: ObjectType);

    /// A node of this type reached a terminal status.
    fn node_terminal(&self, object_type: ObjectType, status: Status);
}

/// Emits `tracing` events/counters; no external metrics backend required.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn node_started(&self, object_type: ObjectType) {
        tracing::debug!(?object_type, "node started");
    }

    fn node_stopped(&self, object_type: ObjectType) {
        tracing::debug!(?object_type, "node stopped running");
    }

    fn node_terminal(&self, object_type: ObjectType, status: Status) {
        tracing::debug!(?object_type, ?status, "node reached terminal status");
    }
}

/// Discards everything; for tests that don't care about observability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {
    fn node_started(&self, _object_type: ObjectType) {}
    fn node_stopped(&self, _object_type: ObjectType) {}
    fn node_terminal(&self, _object_type: ObjectType, _status: Status) {}
}
