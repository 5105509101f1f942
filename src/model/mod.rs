mod batch_change;
mod bulk_operation;
mod changeset;
mod code_host;
mod rewirer;

pub use batch_change::{BatchChange, BatchSpec};
pub use bulk_operation::{BulkOperation, BulkOperationState};
pub use changeset::{
    Changeset, ChangesetEvent, ChangesetExternalState, ChangesetPublicationState, ChangesetSpec,
    PublicationIntent,
};
pub use code_host::{CodeHost, Credential};
pub use rewirer::{
    ReconcilerOperation, RewirerMapping, RewirerMappingPage, RewirerMappingPageOpts,
    RewirerMappings,
};

pub type BatchChangeId = i64;
pub type BatchSpecId = i64;
pub type ChangesetId = i64;
pub type ChangesetSpecId = i64;
pub type ChangesetEventId = i64;
pub type BulkOperationId = i64;
pub type RepoId = i64;
pub type UserId = i64;
pub type CredentialId = i64;

/// A repository as the authz layer sees it: private repos are only visible
/// to viewers holding an explicit permission row.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub private: bool,
}
