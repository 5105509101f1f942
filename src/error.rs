use thiserror::Error;

use crate::model::{BatchSpecId, ChangesetSpecId};

/// Domain errors surfaced to the wire layer. Anything not covered here
/// travels as a plain `anyhow::Error` with context attached at the call site.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchesError {
    /// The viewer cannot see the repository behind this changeset; operations
    /// and other restricted fields must be requested through the hidden
    /// variant, which does not expose them.
    #[error("changeset is hidden and does not expose operations")]
    HiddenChangeset,

    /// A client-supplied pagination cursor did not decode to an offset.
    #[error("malformed pagination cursor: {0:?}")]
    MalformedCursor(String),

    /// The changeset spec fixes its publication state; a UI-level override
    /// for the same spec is a conflict, never a silent precedence decision.
    #[error("changeset spec {0} has its publication state set in the spec; the UI override conflicts")]
    ConflictingPublicationState(ChangesetSpecId),

    /// Preview or stats were requested for a batch spec the store does not
    /// know about.
    #[error("no batch spec with id {0}")]
    BatchSpecNotFound(BatchSpecId),
}
