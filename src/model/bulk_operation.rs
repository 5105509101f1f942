use serde::Serialize;

use super::{BatchChangeId, BulkOperationId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BulkOperationState {
    Processing,
    Failed,
    Completed,
}

impl BulkOperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOperationState::Processing => "PROCESSING",
            BulkOperationState::Failed => "FAILED",
            BulkOperationState::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PROCESSING" => Some(BulkOperationState::Processing),
            "FAILED" => Some(BulkOperationState::Failed),
            "COMPLETED" => Some(BulkOperationState::Completed),
            _ => None,
        }
    }
}

/// A bulk action (comment, close, merge, ...) queued across many changesets
/// of one batch change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkOperation {
    pub id: BulkOperationId,
    pub batch_change_id: BatchChangeId,
    pub user_id: UserId,
    /// Free-form action name as recorded by the worker ("comment", "close", ...).
    pub op_type: String,
    pub state: BulkOperationState,
    pub created_at: i64,
}
