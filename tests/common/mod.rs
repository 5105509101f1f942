// Shared test fixtures for integration tests
// Functions here are used across different test files
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;

use batchwork::model::{
    BatchChange, BatchSpec, BulkOperation, Changeset, ChangesetEvent,
    ChangesetPublicationState, ChangesetSpec, CodeHost, Credential, Repo, RepoId, UserId,
};
use batchwork::store::{
    BatchesStore, Database, ListBatchChangesOpts, ListBatchSpecsOpts, ListBulkOperationsOpts,
    ListChangesetEventsOpts, ListChangesetSpecsOpts, ListChangesetsOpts, Viewer,
};

/// Create an in-memory test database with initialized schema
pub async fn create_test_db() -> Database {
    let db = Database::new(":memory:").await.unwrap();
    db.init_schema().await.unwrap();
    db
}

pub fn viewer() -> Viewer {
    Viewer { user_id: 1, site_admin: false }
}

pub async fn create_repo(db: &Database, name: &str, private: bool) -> Repo {
    db.create_repo(name, private).await.unwrap()
}

pub async fn create_batch_spec(db: &Database, namespace: &str, created_at: i64) -> i64 {
    db.create_batch_spec(&BatchSpec {
        id: 0,
        namespace: namespace.to_string(),
        user_id: 1,
        raw_spec: "name: test".to_string(),
        created_at,
    })
    .await
    .unwrap()
}

pub async fn create_batch_change(
    db: &Database,
    namespace: &str,
    name: &str,
    batch_spec_id: i64,
    last_applied_at: i64,
) -> i64 {
    db.create_batch_change(&BatchChange {
        id: 0,
        name: name.to_string(),
        namespace: namespace.to_string(),
        description: String::new(),
        creator_id: 1,
        last_applied_at,
        closed_at: None,
        batch_spec_id,
    })
    .await
    .unwrap()
}

pub fn changeset(repo_id: RepoId, batch_change_id: i64, head_ref: &str) -> Changeset {
    Changeset {
        id: 0,
        repo_id,
        batch_change_id: Some(batch_change_id),
        owned_by_batch_change_id: Some(batch_change_id),
        current_spec_id: None,
        external_id: None,
        head_ref: head_ref.to_string(),
        title: "A change".to_string(),
        body: String::new(),
        diff: "diff".to_string(),
        publication_state: ChangesetPublicationState::Published,
        external_state: Some(batchwork::model::ChangesetExternalState::Open),
        next_sync_at: None,
    }
}

pub fn changeset_spec(batch_spec_id: i64, repo_id: RepoId, head_ref: &str) -> ChangesetSpec {
    ChangesetSpec {
        id: 0,
        batch_spec_id,
        repo_id,
        head_ref: head_ref.to_string(),
        title: "A change".to_string(),
        body: String::new(),
        diff: "diff".to_string(),
        published: None,
        external_id: None,
    }
}

pub fn code_host(esid: &str, esty: &str) -> CodeHost {
    CodeHost {
        external_service_id: esid.to_string(),
        external_service_type: esty.to_string(),
        url: format!("https://{esty}.example.com"),
    }
}

pub fn credential(user_id: Option<UserId>, esid: &str, esty: &str, token: &str) -> Credential {
    Credential {
        id: 0,
        user_id,
        external_service_id: esid.to_string(),
        external_service_type: esty.to_string(),
        token: token.to_string(),
    }
}

/// Store decorator counting list/count calls and optionally failing them;
/// used to verify connection memoization and error caching.
pub struct CountingStore {
    inner: Arc<dyn BatchesStore>,
    pub list_calls: AtomicUsize,
    pub count_calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl CountingStore {
    pub fn new(inner: Arc<dyn BatchesStore>) -> Self {
        Self {
            inner,
            list_calls: AtomicUsize::new(0),
            count_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn counts(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }

    fn on_list(&self) -> Result<()> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("store is down");
        }
        Ok(())
    }

    fn on_count(&self) -> Result<()> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("store is down");
        }
        Ok(())
    }
}

#[async_trait]
impl BatchesStore for CountingStore {
    async fn get_batch_change_by_namespace_and_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BatchChange>> {
        self.inner
            .get_batch_change_by_namespace_and_name(namespace, name)
            .await
    }

    async fn get_batch_change(&self, id: i64) -> Result<Option<BatchChange>> {
        self.inner.get_batch_change(id).await
    }

    async fn get_batch_spec(&self, id: i64) -> Result<Option<BatchSpec>> {
        self.inner.get_batch_spec(id).await
    }

    async fn list_batch_changes(
        &self,
        opts: &ListBatchChangesOpts,
    ) -> Result<(Vec<BatchChange>, i64)> {
        self.on_list()?;
        self.inner.list_batch_changes(opts).await
    }

    async fn count_batch_changes(&self, opts: &ListBatchChangesOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_batch_changes(opts).await
    }

    async fn list_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<(Vec<BatchSpec>, i64)> {
        self.on_list()?;
        self.inner.list_batch_specs(opts).await
    }

    async fn count_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_batch_specs(opts).await
    }

    async fn list_changesets(&self, opts: &ListChangesetsOpts) -> Result<(Vec<Changeset>, i64)> {
        self.on_list()?;
        self.inner.list_changesets(opts).await
    }

    async fn count_changesets(&self, opts: &ListChangesetsOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_changesets(opts).await
    }

    async fn list_changeset_specs(
        &self,
        opts: &ListChangesetSpecsOpts,
    ) -> Result<(Vec<ChangesetSpec>, i64)> {
        self.on_list()?;
        self.inner.list_changeset_specs(opts).await
    }

    async fn count_changeset_specs(&self, opts: &ListChangesetSpecsOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_changeset_specs(opts).await
    }

    async fn list_changeset_events(
        &self,
        opts: &ListChangesetEventsOpts,
    ) -> Result<(Vec<ChangesetEvent>, i64)> {
        self.on_list()?;
        self.inner.list_changeset_events(opts).await
    }

    async fn count_changeset_events(&self, opts: &ListChangesetEventsOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_changeset_events(opts).await
    }

    async fn list_bulk_operations(
        &self,
        opts: &ListBulkOperationsOpts,
    ) -> Result<(Vec<BulkOperation>, i64)> {
        self.on_list()?;
        self.inner.list_bulk_operations(opts).await
    }

    async fn count_bulk_operations(&self, opts: &ListBulkOperationsOpts) -> Result<i64> {
        self.on_count()?;
        self.inner.count_bulk_operations(opts).await
    }

    async fn list_code_hosts(&self) -> Result<Vec<CodeHost>> {
        self.on_list()?;
        self.inner.list_code_hosts().await
    }

    async fn list_user_credentials(&self, user_id: UserId) -> Result<Vec<Credential>> {
        self.inner.list_user_credentials(user_id).await
    }

    async fn list_site_credentials(&self) -> Result<Vec<Credential>> {
        self.inner.list_site_credentials().await
    }

    async fn visible_repos(&self, viewer: &Viewer, repo_ids: &[RepoId]) -> Result<Vec<Repo>> {
        self.inner.visible_repos(viewer, repo_ids).await
    }

    async fn changeset_next_sync(&self, ids: &[i64]) -> Result<Vec<(i64, i64)>> {
        self.inner.changeset_next_sync(ids).await
    }
}
