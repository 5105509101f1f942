//! Connections over batch changes and batch specs.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{BatchChange, BatchSpec};
use crate::store::{BatchesStore, ListBatchChangesOpts, ListBatchSpecsOpts};

use super::connection::{ConnectionLoader, CursorConnection};

pub struct BatchChangesLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListBatchChangesOpts,
}

#[async_trait]
impl ConnectionLoader for BatchChangesLoader {
    type Node = BatchChange;

    async fn list(&self) -> Result<(Vec<BatchChange>, i64)> {
        self.store.list_batch_changes(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_batch_changes(&self.opts).await
    }
}

pub type BatchChangesConnection = CursorConnection<BatchChangesLoader>;

/// Batch changes in most-recently-applied-first order.
pub fn batch_changes_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListBatchChangesOpts,
) -> BatchChangesConnection {
    CursorConnection::new(BatchChangesLoader { store, opts })
}

pub struct BatchSpecsLoader {
    store: Arc<dyn BatchesStore>,
    opts: ListBatchSpecsOpts,
}

#[async_trait]
impl ConnectionLoader for BatchSpecsLoader {
    type Node = BatchSpec;

    async fn list(&self) -> Result<(Vec<BatchSpec>, i64)> {
        self.store.list_batch_specs(&self.opts).await
    }

    async fn count(&self) -> Result<i64> {
        self.store.count_batch_specs(&self.opts).await
    }
}

pub type BatchSpecsConnection = CursorConnection<BatchSpecsLoader>;

pub fn batch_specs_connection(
    store: Arc<dyn BatchesStore>,
    opts: ListBatchSpecsOpts,
) -> BatchSpecsConnection {
    CursorConnection::new(BatchSpecsLoader { store, opts })
}

/// Look up one batch change by its namespace/name pair.
pub async fn batch_change_by_namespace_and_name(
    store: &dyn BatchesStore,
    namespace: &str,
    name: &str,
) -> Result<Option<BatchChange>> {
    store
        .get_batch_change_by_namespace_and_name(namespace, name)
        .await
}
