//! A cheap "something changed" signal threaded through every runner.
//!
//! Runners don't know how to build a [`stratum_vault::PlanSnapshot`] of the
//! whole tree — only the orchestrator, which holds the root `Arc<Plan>`,
//! can. So runners just fire this unbounded, infallible signal after each
//! node persists; the orchestrator coalesces bursts of signals into a
//! single fresh snapshot per drain (see `plan::run_plan`'s emitter task).

use tokio::sync::mpsc;

#[derive(Clone)]
pub struct Dirty(Option<mpsc::UnboundedSender<()>>);

impl Dirty {
    pub fn new(tx: mpsc::UnboundedSender<()>) -> Self {
        Self(Some(tx))
    }

    /// A no-op signal, for call sites (tests, benchmarks) that don't drive a result stream.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn mark(&self) {
        if let Some(tx) = &self.0 {
            let _ = tx.send(());
        }
    }
}
