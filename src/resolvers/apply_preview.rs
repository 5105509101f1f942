//! The apply-preview core: a facade over one precomputed rewirer-mapping
//! sequence that supports filtered + offset/limit paging of a computed (not
//! stored) list, memoizes every distinct query shape, and hands out
//! identity-stable per-mapping resolvers.
//!
//! Everything here is scoped to a single request; the caches are never
//! invalidated, only discarded with the facade.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::debug;

use crate::error::BatchesError;
use crate::model::{
    BatchChange, BatchSpecId, Changeset, ChangesetSpec, ReconcilerOperation, RewirerMapping,
    RewirerMappingPage, RewirerMappingPageOpts, RewirerMappings,
};
use crate::reconciler::{self, UiPublicationStates};
use crate::store::BatchesStore;

use super::connection::PageInfo;

/// How a mapping would change the batch change, derived from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewTarget {
    /// Only a spec: a new changeset would be attached.
    Attach,
    /// Spec and changeset: the existing changeset would be updated.
    Update,
    /// Only a changeset: it would be detached.
    Detach,
}

/// Preview of one mapping the viewer is allowed to see in full.
pub struct VisibleApplyPreview {
    mapping: RewirerMapping,
    batch_spec_id: BatchSpecId,
    batch_change: Option<BatchChange>,
    ui_states: Arc<UiPublicationStates>,
    store: Arc<dyn BatchesStore>,
    /// Preloaded next-sync time; 0 means "known to have none". `None` means
    /// not preloaded, so asking for it hits the store.
    preloaded_next_sync_at: Mutex<Option<i64>>,
    operations: OnceCell<Vec<ReconcilerOperation>>,
}

impl VisibleApplyPreview {
    pub fn target(&self) -> PreviewTarget {
        match (&self.mapping.changeset_spec_id, &self.mapping.changeset_id) {
            (Some(_), None) => PreviewTarget::Attach,
            (Some(_), Some(_)) => PreviewTarget::Update,
            _ => PreviewTarget::Detach,
        }
    }

    pub fn changeset_spec(&self) -> Option<&Arc<ChangesetSpec>> {
        self.mapping.changeset_spec.as_ref()
    }

    pub fn changeset(&self) -> Option<&Arc<Changeset>> {
        self.mapping.changeset.as_ref()
    }

    pub fn batch_spec_id(&self) -> BatchSpecId {
        self.batch_spec_id
    }

    pub fn batch_change(&self) -> Option<&BatchChange> {
        self.batch_change.as_ref()
    }

    /// The reconciler operations applying the spec would trigger for this
    /// mapping. Computed at most once per resolver; a failure is not cached
    /// and re-attempted on the next call.
    pub async fn operations(&self) -> Result<Vec<ReconcilerOperation>> {
        let ops = self
            .operations
            .get_or_try_init(|| async {
                reconciler::determine_operations(
                    self.mapping.changeset_spec.as_deref(),
                    self.mapping.changeset.as_deref(),
                    &self.ui_states,
                )
            })
            .await?;
        Ok(ops.clone())
    }

    /// When the reconciler will next sync the underlying changeset; uses the
    /// preloaded value when the caller provided one, otherwise asks the store.
    pub async fn next_sync_at(&self) -> Result<Option<i64>> {
        let preloaded = *self.preloaded_next_sync_at.lock().unwrap();
        if let Some(at) = preloaded {
            return Ok((at != 0).then_some(at));
        }
        let Some(changeset_id) = self.mapping.changeset_id else {
            return Ok(None);
        };
        let times = self.store.changeset_next_sync(&[changeset_id]).await?;
        Ok(times.first().map(|&(_, at)| at))
    }

    fn set_preloaded_next_sync(&self, at: i64) {
        *self.preloaded_next_sync_at.lock().unwrap() = Some(at);
    }
}

/// Preview of a mapping whose repository the viewer cannot see. Restricted
/// fields are not exposed; asking for operations is an error by design.
pub struct HiddenApplyPreview {
    mapping: RewirerMapping,
}

impl HiddenApplyPreview {
    pub fn target(&self) -> PreviewTarget {
        match (&self.mapping.changeset_spec_id, &self.mapping.changeset_id) {
            (Some(_), None) => PreviewTarget::Attach,
            (Some(_), Some(_)) => PreviewTarget::Update,
            _ => PreviewTarget::Detach,
        }
    }

    pub fn operations(&self) -> Result<Vec<ReconcilerOperation>> {
        Err(BatchesError::HiddenChangeset.into())
    }
}

/// Per-mapping preview resolver: a two-variant tagged union the caller must
/// discriminate before requesting variant-specific fields.
pub enum ApplyPreviewResolver {
    Visible(VisibleApplyPreview),
    Hidden(HiddenApplyPreview),
}

impl ApplyPreviewResolver {
    pub fn as_visible(&self) -> Option<&VisibleApplyPreview> {
        match self {
            ApplyPreviewResolver::Visible(v) => Some(v),
            ApplyPreviewResolver::Hidden(_) => None,
        }
    }

    pub fn as_hidden(&self) -> Option<&HiddenApplyPreview> {
        match self {
            ApplyPreviewResolver::Hidden(h) => Some(h),
            ApplyPreviewResolver::Visible(_) => None,
        }
    }

    pub fn target(&self) -> PreviewTarget {
        match self {
            ApplyPreviewResolver::Visible(v) => v.target(),
            ApplyPreviewResolver::Hidden(h) => h.target(),
        }
    }

    fn set_preloaded_next_sync(&self, at: i64) {
        if let ApplyPreviewResolver::Visible(v) = self {
            v.set_preloaded_next_sync(at);
        }
    }
}

#[derive(Default)]
struct FacadeCaches {
    /// Operations per mapping, derived at most once per facade and shared by
    /// every operation filter and by stats. Hidden mappings hold an empty
    /// list, so they never match a filter.
    operations: Option<Arc<Vec<Vec<ReconcilerOperation>>>>,
    /// One entry per distinct opts value; only successes are stored.
    pages: FxHashMap<RewirerMappingPageOpts, RewirerMappingPage>,
}

/// Reconciliation cache over one rewirer-mapping sequence.
///
/// Safe to share across concurrently resolved fields of one request: the
/// page/operations caches sit behind an async mutex (first caller computes,
/// everyone observes the completed result) and the resolver table behind a
/// plain one (construction never awaits).
pub struct RewirerMappingsFacade {
    store: Arc<dyn BatchesStore>,
    mappings: RewirerMappings,
    batch_spec_id: BatchSpecId,
    batch_change: Option<BatchChange>,
    ui_states: Arc<UiPublicationStates>,
    caches: AsyncMutex<FacadeCaches>,
    resolvers: Mutex<FxHashMap<usize, Arc<ApplyPreviewResolver>>>,
}

impl RewirerMappingsFacade {
    pub fn new(
        store: Arc<dyn BatchesStore>,
        mappings: RewirerMappings,
        batch_spec_id: BatchSpecId,
        batch_change: Option<BatchChange>,
        ui_states: UiPublicationStates,
    ) -> Self {
        Self {
            store,
            mappings,
            batch_spec_id,
            batch_change,
            ui_states: Arc::new(ui_states),
            caches: AsyncMutex::new(FacadeCaches::default()),
            resolvers: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn mappings(&self) -> &RewirerMappings {
        &self.mappings
    }

    pub fn mapping(&self, idx: usize) -> &RewirerMapping {
        &self.mappings[idx]
    }

    pub fn store(&self) -> &Arc<dyn BatchesStore> {
        &self.store
    }

    /// One filtered/sliced window over the mapping sequence. Structurally
    /// equal opts hit the same cached page; failures are never cached, so a
    /// retried call re-attempts the computation.
    pub async fn page(&self, opts: RewirerMappingPageOpts) -> Result<RewirerMappingPage> {
        let mut caches = self.caches.lock().await;
        if let Some(page) = caches.pages.get(&opts) {
            return Ok(page.clone());
        }

        let matching: Vec<usize> = match opts.operation {
            Some(op) => {
                let ops = self.derive_operations(&mut caches).await?;
                (0..self.mappings.len())
                    .filter(|&idx| ops[idx].contains(&op))
                    .collect()
            }
            None => (0..self.mappings.len()).collect(),
        };

        let page = RewirerMappingPage {
            total_count: matching.len(),
            mapping_indices: slice_window(&matching, opts.limit, opts.offset),
        };
        debug!(?opts, total = page.total_count, "computed rewirer mapping page");
        caches.pages.insert(opts, page.clone());
        Ok(page)
    }

    /// Operation counts and added/modified/removed classification across the
    /// full unfiltered mapping set. Shares the operation derivation with
    /// [`Self::page`], so a preceding page call makes this free.
    pub async fn stats(&self) -> Result<ApplyPreviewStats> {
        let ops = {
            let mut caches = self.caches.lock().await;
            self.derive_operations(&mut caches).await?
        };

        let mut stats = ApplyPreviewStats::default();
        for (mapping, mapping_ops) in self.mappings.iter().zip(ops.iter()) {
            for op in mapping_ops {
                stats.count(*op);
            }
            match (mapping.changeset_spec_id.is_some(), mapping.changeset_id.is_some()) {
                (true, false) => stats.added += 1,
                (true, true) => stats.modified += 1,
                (false, true) => stats.removed += 1,
                (false, false) => {}
            }
        }
        Ok(stats)
    }

    /// The memoized resolver for mapping `idx`: the same mapping always
    /// yields the same resolver instance, since resolvers carry mutable
    /// preload state.
    pub fn resolver(&self, idx: usize) -> Arc<ApplyPreviewResolver> {
        let mut table = self.resolvers.lock().unwrap();
        table
            .entry(idx)
            .or_insert_with(|| Arc::new(self.build_resolver(idx)))
            .clone()
    }

    /// Same memoization table as [`Self::resolver`], but with an explicit
    /// next-sync preload so the resolver skips the redundant store lookup.
    /// `at == 0` records that no sync is scheduled.
    pub fn resolver_with_next_sync(&self, idx: usize, at: i64) -> Arc<ApplyPreviewResolver> {
        let resolver = self.resolver(idx);
        resolver.set_preloaded_next_sync(at);
        resolver
    }

    /// Number of distinct page shapes served so far; used by tests to verify
    /// the cache key behavior.
    pub async fn cached_page_count(&self) -> usize {
        self.caches.lock().await.pages.len()
    }

    /// Whether the per-mapping operation derivation has run; used by tests.
    pub async fn operations_derived(&self) -> bool {
        self.caches.lock().await.operations.is_some()
    }

    async fn derive_operations(
        &self,
        caches: &mut FacadeCaches,
    ) -> Result<Arc<Vec<Vec<ReconcilerOperation>>>> {
        if let Some(ops) = &caches.operations {
            return Ok(ops.clone());
        }

        let mut all = Vec::with_capacity(self.mappings.len());
        for idx in 0..self.mappings.len() {
            let resolver = self.resolver(idx);
            let ops = match resolver.as_visible() {
                Some(visible) => visible.operations().await?,
                // Hidden mappings never match any operation filter.
                None => Vec::new(),
            };
            all.push(ops);
        }

        let all = Arc::new(all);
        caches.operations = Some(all.clone());
        Ok(all)
    }

    fn build_resolver(&self, idx: usize) -> ApplyPreviewResolver {
        let mapping = self.mappings[idx].clone();
        if mapping.is_hidden() {
            ApplyPreviewResolver::Hidden(HiddenApplyPreview { mapping })
        } else {
            ApplyPreviewResolver::Visible(VisibleApplyPreview {
                mapping,
                batch_spec_id: self.batch_spec_id,
                batch_change: self.batch_change.clone(),
                ui_states: self.ui_states.clone(),
                store: self.store.clone(),
                preloaded_next_sync_at: Mutex::new(None),
                operations: OnceCell::new(),
            })
        }
    }
}

/// Apply the offset/limit window to the filtered index list. Negative or
/// out-of-bounds inputs yield an empty window, never an error.
fn slice_window(matching: &[usize], limit: i64, offset: i64) -> Vec<usize> {
    if limit < 0 || offset < 0 {
        return Vec::new();
    }
    let start = offset as usize;
    if start >= matching.len() {
        return Vec::new();
    }
    let end = match limit {
        0 => matching.len(),
        n => (start + n as usize).min(matching.len()),
    };
    matching[start..end].to_vec()
}

/// Aggregate counts across the full unfiltered mapping set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplyPreviewStats {
    pub push: i32,
    pub update: i32,
    pub undraft: i32,
    pub publish: i32,
    pub publish_draft: i32,
    pub sync: i32,
    pub import: i32,
    pub close: i32,
    pub reopen: i32,
    pub sleep: i32,
    pub detach: i32,
    pub added: i32,
    pub modified: i32,
    pub removed: i32,
}

impl ApplyPreviewStats {
    fn count(&mut self, op: ReconcilerOperation) {
        match op {
            ReconcilerOperation::Push => self.push += 1,
            ReconcilerOperation::Update => self.update += 1,
            ReconcilerOperation::Undraft => self.undraft += 1,
            ReconcilerOperation::Publish => self.publish += 1,
            ReconcilerOperation::PublishDraft => self.publish_draft += 1,
            ReconcilerOperation::Sync => self.sync += 1,
            ReconcilerOperation::Import => self.import += 1,
            ReconcilerOperation::Close => self.close += 1,
            ReconcilerOperation::Reopen => self.reopen += 1,
            ReconcilerOperation::Sleep => self.sleep += 1,
            ReconcilerOperation::Detach => self.detach += 1,
        }
    }
}

/// Binds the facade's paging semantics to the connection contract.
pub struct ApplyPreviewConnection {
    facade: Arc<RewirerMappingsFacade>,
    limit: i64,
    offset: i64,
    operation: Option<ReconcilerOperation>,
}

impl ApplyPreviewConnection {
    pub fn new(
        facade: Arc<RewirerMappingsFacade>,
        limit: i64,
        offset: i64,
        operation: Option<ReconcilerOperation>,
    ) -> Self {
        Self { facade, limit, offset, operation }
    }

    fn page_opts(&self) -> RewirerMappingPageOpts {
        RewirerMappingPageOpts {
            limit: self.limit,
            offset: self.offset,
            operation: self.operation,
        }
    }

    /// Resolvers for the current filtered/paged window, in mapping order.
    /// Next-sync times for the window's changesets are batch-loaded up front
    /// and preloaded into the resolvers.
    pub async fn nodes(&self) -> Result<Vec<Arc<ApplyPreviewResolver>>> {
        let page = self.facade.page(self.page_opts()).await?;

        let changeset_ids: Vec<_> = page
            .mapping_indices
            .iter()
            .filter_map(|&idx| self.facade.mapping(idx).changeset_id)
            .collect();
        let next_syncs: FxHashMap<_, _> = self
            .facade
            .store()
            .changeset_next_sync(&changeset_ids)
            .await?
            .into_iter()
            .collect();

        Ok(page
            .mapping_indices
            .iter()
            .map(|&idx| match self.facade.mapping(idx).changeset_id {
                Some(id) => self
                    .facade
                    .resolver_with_next_sync(idx, next_syncs.get(&id).copied().unwrap_or(0)),
                None => self.facade.resolver(idx),
            })
            .collect())
    }

    /// The filtered total (not the grand total of all mappings); identical
    /// across every page of the same query.
    pub async fn total_count(&self) -> Result<i64> {
        let page = self.facade.page(self.page_opts()).await?;
        Ok(page.total_count as i64)
    }

    pub async fn page_info(&self) -> Result<PageInfo> {
        let page = self.facade.page(self.page_opts()).await?;
        if self.limit > 0
            && self.offset >= 0
            && self.offset + self.limit < page.total_count as i64
        {
            Ok(PageInfo::next(self.offset + self.limit))
        } else {
            Ok(PageInfo::done())
        }
    }

    /// Statistics across the full unfiltered mapping set, regardless of the
    /// connection's own filter and window.
    pub async fn stats(&self) -> Result<ApplyPreviewStats> {
        self.facade.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_have_a_counter_for_every_operation() {
        let mut stats = ApplyPreviewStats::default();
        for op in ReconcilerOperation::ALL {
            stats.count(op);
        }
        let total = stats.push
            + stats.update
            + stats.undraft
            + stats.publish
            + stats.publish_draft
            + stats.sync
            + stats.import
            + stats.close
            + stats.reopen
            + stats.sleep
            + stats.detach;
        assert_eq!(total as usize, ReconcilerOperation::ALL.len());
    }

    #[test]
    fn slice_window_handles_bad_inputs() {
        let matching = vec![0, 1, 2, 3, 4];
        assert_eq!(slice_window(&matching, 0, 0), vec![0, 1, 2, 3, 4]);
        assert_eq!(slice_window(&matching, 2, 0), vec![0, 1]);
        assert_eq!(slice_window(&matching, 2, 4), vec![4]);
        assert_eq!(slice_window(&matching, -1, 0), Vec::<usize>::new());
        assert_eq!(slice_window(&matching, 2, -1), Vec::<usize>::new());
        assert_eq!(slice_window(&matching, 2, 5), Vec::<usize>::new());
        assert_eq!(slice_window(&matching, 2, 99), Vec::<usize>::new());
    }
}
