use serde::Serialize;

use super::{BatchChangeId, BatchSpecId, UserId};

/// A named, namespaced campaign applying a batch spec's changeset specs
/// across repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchChange {
    pub id: BatchChangeId,
    pub name: String,
    pub namespace: String,
    pub description: String,
    pub creator_id: UserId,
    /// Unix timestamp of the most recent apply; drives listing order.
    pub last_applied_at: i64,
    pub closed_at: Option<i64>,
    /// The spec currently applied to this batch change.
    pub batch_spec_id: BatchSpecId,
}

impl BatchChange {
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

/// A versioned, immutable description of desired changesets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSpec {
    pub id: BatchSpecId,
    pub namespace: String,
    pub user_id: UserId,
    pub raw_spec: String,
    pub created_at: i64,
}
