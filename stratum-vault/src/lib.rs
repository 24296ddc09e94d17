//! # stratum-vault - Storage vault abstraction for stratum
//!
//! Defines the durable-state contract the scheduler in `stratum-core`
//! depends on: `create`, `read`, `exists`, `delete`, `list`, `search`, and
//! per-node-kind `update_*` calls, plus the serializable snapshot types that
//! flow across it.
//!
//! Ships two implementations:
//! - [`MemoryVault`] - an in-process reference backend used by tests and as
//!   a template for a real one (SQLite, CosmosDB, ...).
//! - [`NullVault`] - a no-op backend for dry runs and benchmarks.
//!
//! Real backends are collaborators behind [`StorageVault`]; this crate does
//! not ship one.

mod error;
mod ids;
mod memory;
mod null;
mod snapshot;
mod status;
mod traits;

pub use error::{Result, VaultError};
pub use ids::NodeId;
pub use memory::MemoryVault;
pub use null::NullVault;
pub use snapshot::{ActionSnapshot, BlockSnapshot, ChecksSnapshot, PlanSnapshot, PlanSummary, SequenceSnapshot};
pub use status::{Attempt, ErrorCode, ErrorInfo, NodeState, ObjectType, Reason, Status};
pub use traits::{SearchFilters, StorageVault};
