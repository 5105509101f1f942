//! Operation planning: which units of work the reconciler would perform to
//! converge one changeset to its spec. This is the pure decision core behind
//! the apply-preview resolvers; it never touches the store.

use anyhow::Result;

use crate::error::BatchesError;
use crate::model::{
    Changeset, ChangesetExternalState, ChangesetPublicationState, ChangesetSpec,
    PublicationIntent, ReconcilerOperation,
};

/// UI-level publication overrides for specs that leave `published` unset.
/// Consulting an override for a spec that fixes its own publication state is
/// a conflict and fails the whole preview.
#[derive(Debug, Clone, Default)]
pub struct UiPublicationStates {
    overrides: Vec<(i64, PublicationIntent)>,
}

impl UiPublicationStates {
    pub fn new(overrides: Vec<(i64, PublicationIntent)>) -> Self {
        Self { overrides }
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    /// The effective publication intent for `spec`: the spec's own setting if
    /// present, otherwise the UI override, otherwise unpublished.
    pub fn effective_intent(&self, spec: &ChangesetSpec) -> Result<PublicationIntent> {
        let ui = self
            .overrides
            .iter()
            .find(|(id, _)| *id == spec.id)
            .map(|(_, intent)| *intent);
        match (spec.published, ui) {
            (Some(_), Some(_)) => Err(BatchesError::ConflictingPublicationState(spec.id).into()),
            (Some(intent), None) => Ok(intent),
            (None, Some(intent)) => Ok(intent),
            (None, None) => Ok(PublicationIntent::Unpublished),
        }
    }
}

/// Compute the ordered operation list for one spec/changeset pairing.
///
/// Ordering invariant: side-effect-producing operations (Push) precede
/// terminal ones (Publish, PublishDraft).
pub fn determine_operations(
    spec: Option<&ChangesetSpec>,
    changeset: Option<&Changeset>,
    ui_states: &UiPublicationStates,
) -> Result<Vec<ReconcilerOperation>> {
    match (spec, changeset) {
        // Attach: a new changeset would be created for this spec.
        (Some(spec), None) => attach_operations(spec, ui_states),

        // Detach: the spec no longer wants this changeset.
        (None, Some(changeset)) => {
            let mut ops = Vec::new();
            if changeset.owned_by_batch_change_id.is_some()
                && changeset.is_published()
                && changeset.is_open()
            {
                ops.push(ReconcilerOperation::Close);
            }
            ops.push(ReconcilerOperation::Detach);
            Ok(ops)
        }

        (Some(spec), Some(changeset)) => pair_operations(spec, changeset, ui_states),

        // The rewirer never emits such a mapping.
        (None, None) => Ok(Vec::new()),
    }
}

fn attach_operations(
    spec: &ChangesetSpec,
    ui_states: &UiPublicationStates,
) -> Result<Vec<ReconcilerOperation>> {
    if spec.is_tracking() {
        return Ok(vec![ReconcilerOperation::Import]);
    }
    Ok(match ui_states.effective_intent(spec)? {
        PublicationIntent::Published => {
            vec![ReconcilerOperation::Push, ReconcilerOperation::Publish]
        }
        PublicationIntent::Draft => {
            vec![ReconcilerOperation::Push, ReconcilerOperation::PublishDraft]
        }
        // The changeset spec is only attached; nothing reaches the code host.
        PublicationIntent::Unpublished => Vec::new(),
    })
}

fn pair_operations(
    spec: &ChangesetSpec,
    changeset: &Changeset,
    ui_states: &UiPublicationStates,
) -> Result<Vec<ReconcilerOperation>> {
    // A still-unpublished changeset behaves like a fresh attach.
    if changeset.publication_state == ChangesetPublicationState::Unpublished {
        return attach_operations(spec, ui_states);
    }

    let mut ops = Vec::new();

    if spec.diff != changeset.diff {
        ops.push(ReconcilerOperation::Push);
    }
    if spec.title != changeset.title || spec.body != changeset.body {
        ops.push(ReconcilerOperation::Update);
    }
    if changeset.external_state == Some(ChangesetExternalState::Draft)
        && ui_states.effective_intent(spec)? == PublicationIntent::Published
    {
        ops.push(ReconcilerOperation::Undraft);
    }
    if changeset.external_state == Some(ChangesetExternalState::Closed) {
        ops.push(ReconcilerOperation::Reopen);
    }

    // A tracked pair with no pending work gets refreshed from the code host.
    if ops.is_empty() && spec.is_tracking() {
        ops.push(ReconcilerOperation::Sync);
    }

    Ok(ops)
}
