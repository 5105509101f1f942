//! Connections over changesets, changeset specs, changeset events, and bulk
//! operations. All four are thin bindings of store list/count pairs to the
//! generic cursor connection; changeset listing carries the viewer for
//! repo-permission enforcement in its opts.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{BulkOperation, Changeset, ChangesetEvent, ChangesetSpec};
use crate::store::{
    BatchesStore, ListBulkOperationsOpts, ListChangesetEventsOpts, ListChangesetSpecsOpts,
    ListChangesetsOpts,
};

use super::connection::{ConnectionLoader, CursorConnection};

pub struct ChangesetsLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetsOpts,
}

#[async_trait]
impl ConnectionLoader for ChangesetsLoader {
    type Node = Changeset;

    async fn list(&self) -> Result<(Vec<Changeset>, i64)> {
        self.store.list_changesets(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_changesets(&self.opts).await
    }
}

pub type ChangesetsConnection = CursorConnection<ChangesetsLoader>;

pub fn changesets_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetsOpts,
) -> ChangesetsConnection {
    CursorConnection::new(ChangesetsLoader { store, opts })
}

pub struct ChangesetSpecsLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetSpecsOpts,
}

#[async_trait]
impl ConnectionLoader for ChangesetSpecsLoader {
    type Node = ChangesetSpec;

    async fn list(&self) -> Result<(Vec<ChangesetSpec>, i64)> {
        self.store.list_changeset_specs(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_changeset_specs(&self.opts).await
    }
}

pub type ChangesetSpecsConnection = CursorConnection<ChangesetSpecsLoader>;

pub fn changeset_specs_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetSpecsOpts,
) -> ChangesetSpecsConnection {
    CursorConnection::new(ChangesetSpecsLoader { store, opts })
}

pub struct ChangesetEventsLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetEventsOpts,
}

#[async_trait]
impl ConnectionLoader for ChangesetEventsLoader {
    type Node = ChangesetEvent;

    async fn list(&self) -> Result<(Vec<ChangesetEvent>, i64)> {
        self.store.list_changeset_events(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_changeset_events(&self.opts).await
    }
}

pub type ChangesetEventsConnection = CursorConnection<ChangesetEventsLoader>;

pub fn changeset_events_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListChangesetEventsOpts,
) -> ChangesetEventsConnection {
    CursorConnection::new(ChangesetEventsLoader { store, opts })
}

pub struct BulkOperationsLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListBulkOperationsOpts,
}

#[async_trait]
impl ConnectionLoader for BulkOperationsLoader {
    type Node = BulkOperation;

    async fn list(&self) -> Result<(Vec<BulkOperation>, i64)> {
        self.store.list_bulk_operations(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_bulk_operations(&self.opts).await
    }
}

pub type BulkOperationsConnection = CursorConnection<BulkOperationsLoader>;

pub fn bulk_operations_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListBulkOperationsOpts,
) -> BulkOperationsConnection {
    CursorConnection::new(BulkOperationsLoader { store, opts })
}
