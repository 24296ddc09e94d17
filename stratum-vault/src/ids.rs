//! Time-ordered node identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A time-ordered 128-bit identifier assigned to every node in a plan tree.
///
/// Backed by UUIDv7 so that IDs sort chronologically by construction order,
/// which is convenient for `List`'s newest-first ordering without a separate
/// sequence column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(uuid::Uuid);

impl NodeId {
    /// Mint a new, time-ordered ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> uuid::Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<uuid::Uuid> for NodeId {
    fn from(u: uuid::Uuid) -> Self {
        Self(u)
    }
}
