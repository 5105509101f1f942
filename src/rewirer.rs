//! Pairs the changeset specs of a batch spec (desired state) with the
//! changesets currently attached to the target batch change, producing the
//! ordered mapping sequence the apply-preview resolvers page over.

use std::sync::Arc;

use anyhow::Result;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::error::BatchesError;
use crate::model::{
    BatchChange, BatchSpecId, Changeset, ChangesetSpec, RewirerMapping, RewirerMappings,
};
use crate::store::{BatchesStore, ListChangesetSpecsOpts, ListChangesetsOpts, Viewer};

/// Compute the rewirer mappings for applying `batch_spec_id` to
/// `batch_change` (or to a brand-new batch change when `None`).
///
/// Ordering is stable: spec-bearing mappings in changeset-spec id order,
/// then detach mappings in changeset id order. Repositories the viewer
/// cannot see are left unhydrated, which marks the mapping hidden.
pub async fn rewirer_mappings(
    store: &dyn BatchesStore,
    batch_spec_id: BatchSpecId,
    batch_change: Option<&BatchChange>,
    viewer: &Viewer,
) -> Result<RewirerMappings> {
    if store.get_batch_spec(batch_spec_id).await?.is_none() {
        return Err(BatchesError::BatchSpecNotFound(batch_spec_id).into());
    }

    let (specs, _) = store
        .list_changeset_specs(&ListChangesetSpecsOpts {
            batch_spec_id: Some(batch_spec_id),
            ..Default::default()
        })
        .await?;

    let changesets = match batch_change {
        Some(bc) => {
            store
                .list_changesets(&ListChangesetsOpts {
                    batch_change_id: Some(bc.id),
                    ..Default::default()
                })
                .await?
                .0
        }
        None => Vec::new(),
    };

    let mut mappings = pair(specs, changesets);
    hydrate_repos(store, viewer, &mut mappings).await?;

    debug!(
        batch_spec_id,
        mappings = mappings.len(),
        "computed rewirer mappings"
    );
    Ok(mappings.into())
}

fn pair(specs: Vec<ChangesetSpec>, changesets: Vec<Changeset>) -> Vec<RewirerMapping> {
    let mut remaining: Vec<Option<Changeset>> = changesets.into_iter().map(Some).collect();
    let mut mappings = Vec::with_capacity(specs.len() + remaining.len());

    for spec in specs {
        let matched = remaining.iter_mut().find(|slot| {
            slot.as_ref().is_some_and(|c| {
                c.repo_id == spec.repo_id
                    && match &spec.external_id {
                        // Tracking specs pair with the tracked pull request.
                        Some(external_id) => c.external_id.as_deref() == Some(external_id),
                        None => c.head_ref == spec.head_ref,
                    }
            })
        });
        let changeset = matched.and_then(Option::take).map(Arc::new);

        mappings.push(RewirerMapping {
            changeset_spec_id: Some(spec.id),
            changeset_id: changeset.as_ref().map(|c| c.id),
            repo_id: spec.repo_id,
            changeset_spec: Some(Arc::new(spec)),
            changeset,
            repo: None,
        });
    }

    // Whatever is still attached but unwanted gets detached.
    let mut leftovers: Vec<Changeset> = remaining.into_iter().flatten().collect();
    leftovers.sort_by_key(|c| c.id);
    for changeset in leftovers {
        mappings.push(RewirerMapping {
            changeset_spec_id: None,
            changeset_id: Some(changeset.id),
            repo_id: changeset.repo_id,
            changeset_spec: None,
            changeset: Some(Arc::new(changeset)),
            repo: None,
        });
    }

    mappings
}

async fn hydrate_repos(
    store: &dyn BatchesStore,
    viewer: &Viewer,
    mappings: &mut [RewirerMapping],
) -> Result<()> {
    let mut repo_ids: Vec<_> = mappings.iter().map(|m| m.repo_id).collect();
    repo_ids.sort_unstable();
    repo_ids.dedup();

    let visible: FxHashMap<_, _> = store
        .visible_repos(viewer, &repo_ids)
        .await?
        .into_iter()
        .map(|r| (r.id, Arc::new(r)))
        .collect();

    for mapping in mappings {
        mapping.repo = visible.get(&mapping.repo_id).cloned();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangesetExternalState, ChangesetPublicationState};

    fn spec(id: i64, repo_id: i64, head_ref: &str) -> ChangesetSpec {
        ChangesetSpec {
            id,
            batch_spec_id: 1,
            repo_id,
            head_ref: head_ref.to_string(),
            title: String::new(),
            body: String::new(),
            diff: String::new(),
            published: None,
            external_id: None,
        }
    }

    fn changeset(id: i64, repo_id: i64, head_ref: &str) -> Changeset {
        Changeset {
            id,
            repo_id,
            batch_change_id: Some(1),
            owned_by_batch_change_id: Some(1),
            current_spec_id: None,
            external_id: None,
            head_ref: head_ref.to_string(),
            title: String::new(),
            body: String::new(),
            diff: String::new(),
            publication_state: ChangesetPublicationState::Published,
            external_state: Some(ChangesetExternalState::Open),
            next_sync_at: None,
        }
    }

    #[test]
    fn pairs_by_repo_and_head_ref() {
        let mappings = pair(
            vec![spec(1, 10, "refs/heads/a"), spec(2, 20, "refs/heads/b")],
            vec![changeset(100, 20, "refs/heads/b")],
        );

        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].changeset_spec_id, Some(1));
        assert_eq!(mappings[0].changeset_id, None);
        assert_eq!(mappings[1].changeset_spec_id, Some(2));
        assert_eq!(mappings[1].changeset_id, Some(100));
    }

    #[test]
    fn unmatched_changesets_become_detach_mappings_in_id_order() {
        let mappings = pair(
            vec![spec(1, 10, "refs/heads/a")],
            vec![
                changeset(102, 30, "refs/heads/c"),
                changeset(101, 20, "refs/heads/b"),
            ],
        );

        assert_eq!(mappings.len(), 3);
        assert_eq!(mappings[1].changeset_id, Some(101));
        assert!(mappings[1].changeset_spec_id.is_none());
        assert_eq!(mappings[2].changeset_id, Some(102));
    }

    #[test]
    fn tracking_spec_pairs_by_external_id() {
        let mut s = spec(1, 10, "refs/heads/ignored");
        s.external_id = Some("77".to_string());
        let mut c = changeset(100, 10, "refs/heads/other");
        c.external_id = Some("77".to_string());

        let mappings = pair(vec![s], vec![c]);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].changeset_id, Some(100));
    }

    #[test]
    fn same_branch_in_other_repo_does_not_pair() {
        let mappings = pair(
            vec![spec(1, 10, "refs/heads/a")],
            vec![changeset(100, 99, "refs/heads/a")],
        );
        assert_eq!(mappings.len(), 2);
        assert!(mappings[0].changeset_id.is_none());
    }
}
