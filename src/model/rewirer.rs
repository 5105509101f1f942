use std::sync::Arc;

use serde::Serialize;

use super::{Changeset, ChangesetId, ChangesetSpec, ChangesetSpecId, Repo, RepoId};

/// One unit of work the reconciler would perform to converge a changeset to
/// its spec. Side-effect-producing operations (Push) sort before terminal
/// ones (Publish) in a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilerOperation {
    Push,
    Update,
    Undraft,
    Publish,
    PublishDraft,
    Sync,
    Import,
    Close,
    Reopen,
    Sleep,
    Detach,
}

impl ReconcilerOperation {
    /// Every operation, in stats-reporting order.
    pub const ALL: [ReconcilerOperation; 11] = [
        ReconcilerOperation::Push,
        ReconcilerOperation::Update,
        ReconcilerOperation::Undraft,
        ReconcilerOperation::Publish,
        ReconcilerOperation::PublishDraft,
        ReconcilerOperation::Sync,
        ReconcilerOperation::Import,
        ReconcilerOperation::Close,
        ReconcilerOperation::Reopen,
        ReconcilerOperation::Sleep,
        ReconcilerOperation::Detach,
    ];
}

/// One pairing of a changeset spec with an existing changeset, plus the
/// repository both target. At least one of the two ids is always set. A
/// mapping whose `repo` is `None` targets a repository the viewer cannot
/// see and is treated as hidden throughout.
///
/// Built once per apply-preview request by the rewirer; immutable afterwards.
#[derive(Debug, Clone)]
pub struct RewirerMapping {
    pub changeset_spec_id: Option<ChangesetSpecId>,
    pub changeset_id: Option<ChangesetId>,
    pub repo_id: RepoId,

    pub changeset_spec: Option<Arc<ChangesetSpec>>,
    pub changeset: Option<Arc<Changeset>>,
    /// `None` when the authz filter excluded the repository.
    pub repo: Option<Arc<Repo>>,
}

impl RewirerMapping {
    pub fn is_hidden(&self) -> bool {
        self.repo.is_none()
    }
}

/// Ordered sequence of mappings; the order defines pagination order and is
/// stable across repeated rewirer runs with the same inputs.
pub type RewirerMappings = Arc<[RewirerMapping]>;

/// Cache key for one filtered/paginated view over the mapping set. All
/// fields by value: two structurally equal opts must hit the same cache
/// entry.
///
/// `limit == 0` means "no limit"; a negative limit yields an empty page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RewirerMappingPageOpts {
    pub limit: i64,
    pub offset: i64,
    pub operation: Option<ReconcilerOperation>,
}

/// A filtered, sliced window over the mapping sequence. `total_count` is the
/// number of mappings matching the operation filter, independent of slicing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewirerMappingPage {
    /// Indices into the full mapping sequence, in original order.
    pub mapping_indices: Vec<usize>,
    pub total_count: usize,
}
