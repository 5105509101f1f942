mod database;

pub use database::Database;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{
    BatchChange, BatchChangeId, BatchSpec, BatchSpecId, BulkOperation, Changeset,
    ChangesetEvent, ChangesetExternalState, ChangesetId, ChangesetPublicationState, ChangesetSpec,
    CodeHost, Credential, Repo, RepoId, UserId,
};

/// Bumped whenever the table layout changes; a mismatch drops and rebuilds
/// the schema on open.
pub const SCHEMA_VERSION: &str = "v3";

/// The viewer on whose behalf a request runs. Private repos are visible only
/// to site admins and users with an explicit permission row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: UserId,
    pub site_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListBatchChangesOpts {
    pub namespace: Option<String>,
    pub open_only: bool,
    /// 0 means no limit.
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListBatchSpecsOpts {
    pub namespace: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListChangesetsOpts {
    pub batch_change_id: Option<BatchChangeId>,
    pub publication_state: Option<ChangesetPublicationState>,
    pub external_state: Option<ChangesetExternalState>,
    /// Substring match on the changeset title.
    pub text_search: Option<String>,
    pub repo_ids: Vec<RepoId>,
    /// When set, repo-permission filtering is enforced for this viewer.
    pub viewer: Option<Viewer>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListChangesetSpecsOpts {
    pub batch_spec_id: Option<BatchSpecId>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListChangesetEventsOpts {
    pub changeset_id: Option<ChangesetId>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListBulkOperationsOpts {
    pub batch_change_id: Option<BatchChangeId>,
    pub limit: i64,
    pub offset: i64,
}

/// Read interface the resolvers run against. Every `list_*` returns the page
/// plus a next offset, where 0 signals no further page (an offset of 0 can
/// therefore never be a real continuation point; accepted limitation of the
/// cursor scheme). Every `count_*` mirrors the same filters without paging.
///
/// A trait rather than the concrete [`Database`] so tests can interpose
/// instrumented implementations.
#[async_trait]
pub trait BatchesStore: Send + Sync {
    async fn get_batch_change_by_namespace_and_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BatchChange>>;

    async fn get_batch_change(&self, id: BatchChangeId) -> Result<Option<BatchChange>>;

    async fn get_batch_spec(&self, id: BatchSpecId) -> Result<Option<BatchSpec>>;

    async fn list_batch_changes(
        &self,
        opts: &ListBatchChangesOpts,
    ) -> Result<(Vec<BatchChange>, i64)>;
    async fn count_batch_changes(&self, opts: &ListBatchChangesOpts) -> Result<i64>;

    async fn list_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<(Vec<BatchSpec>, i64)>;
    async fn count_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<i64>;

    async fn list_changesets(&self, opts: &ListChangesetsOpts) -> Result<(Vec<Changeset>, i64)>;
    async fn count_changesets(&self, opts: &ListChangesetsOpts) -> Result<i64>;

    async fn list_changeset_specs(
        &self,
        opts: &ListChangesetSpecsOpts,
    ) -> Result<(Vec<ChangesetSpec>, i64)>;
    async fn count_changeset_specs(&self, opts: &ListChangesetSpecsOpts) -> Result<i64>;

    async fn list_changeset_events(
        &self,
        opts: &ListChangesetEventsOpts,
    ) -> Result<(Vec<ChangesetEvent>, i64)>;
    async fn count_changeset_events(&self, opts: &ListChangesetEventsOpts) -> Result<i64>;

    async fn list_bulk_operations(
        &self,
        opts: &ListBulkOperationsOpts,
    ) -> Result<(Vec<BulkOperation>, i64)>;
    async fn count_bulk_operations(&self, opts: &ListBulkOperationsOpts) -> Result<i64>;

    /// The full, stably-ordered code host set; paging happens in memory
    /// downstream, after the credential join.
    async fn list_code_hosts(&self) -> Result<Vec<CodeHost>>;
    async fn list_user_credentials(&self, user_id: UserId) -> Result<Vec<Credential>>;
    async fn list_site_credentials(&self) -> Result<Vec<Credential>>;

    /// The subset of `repo_ids` the viewer may see, as full repo rows.
    async fn visible_repos(&self, viewer: &Viewer, repo_ids: &[RepoId]) -> Result<Vec<Repo>>;

    /// Scheduled next-sync times for the given changesets; ids without a
    /// scheduled sync are absent from the result.
    async fn changeset_next_sync(&self, ids: &[ChangesetId])
    -> Result<Vec<(ChangesetId, i64)>>;
}
