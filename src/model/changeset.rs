use serde::Serialize;

use super::{BatchChangeId, BatchSpecId, ChangesetEventId, ChangesetId, ChangesetSpecId, RepoId};

/// Whether the platform has materialized this changeset on the code host yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangesetPublicationState {
    Unpublished,
    Published,
}

impl ChangesetPublicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetPublicationState::Unpublished => "UNPUBLISHED",
            ChangesetPublicationState::Published => "PUBLISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPUBLISHED" => Some(ChangesetPublicationState::Unpublished),
            "PUBLISHED" => Some(ChangesetPublicationState::Published),
            _ => None,
        }
    }
}

/// State of the pull/merge request on the external code host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangesetExternalState {
    Draft,
    Open,
    Closed,
    Merged,
}

impl ChangesetExternalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetExternalState::Draft => "DRAFT",
            ChangesetExternalState::Open => "OPEN",
            ChangesetExternalState::Closed => "CLOSED",
            ChangesetExternalState::Merged => "MERGED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(ChangesetExternalState::Draft),
            "OPEN" => Some(ChangesetExternalState::Open),
            "CLOSED" => Some(ChangesetExternalState::Closed),
            "MERGED" => Some(ChangesetExternalState::Merged),
            _ => None,
        }
    }
}

/// Publication intent carried by a changeset spec. `None` on the spec means
/// the spec leaves publication to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationIntent {
    Published,
    Draft,
    Unpublished,
}

impl PublicationIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationIntent::Published => "published",
            PublicationIntent::Draft => "draft",
            PublicationIntent::Unpublished => "unpublished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "published" | "true" => Some(PublicationIntent::Published),
            "draft" => Some(PublicationIntent::Draft),
            "unpublished" | "false" => Some(PublicationIntent::Unpublished),
            _ => None,
        }
    }
}

/// The platform's tracked representation of an external pull/merge request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Changeset {
    pub id: ChangesetId,
    pub repo_id: RepoId,
    /// Batch change the changeset is currently attached to, if any.
    pub batch_change_id: Option<BatchChangeId>,
    /// Batch change that created the changeset; `None` for imported ones.
    pub owned_by_batch_change_id: Option<BatchChangeId>,
    pub current_spec_id: Option<ChangesetSpecId>,
    /// Id of the pull request on the code host, for tracked changesets.
    pub external_id: Option<String>,
    pub head_ref: String,
    pub title: String,
    pub body: String,
    pub diff: String,
    pub publication_state: ChangesetPublicationState,
    pub external_state: Option<ChangesetExternalState>,
    /// When the reconciler has scheduled the next sync with the code host.
    pub next_sync_at: Option<i64>,
}

impl Changeset {
    pub fn is_published(&self) -> bool {
        self.publication_state == ChangesetPublicationState::Published
    }

    /// Open on the code host: published and not closed or merged.
    pub fn is_open(&self) -> bool {
        matches!(
            self.external_state,
            Some(ChangesetExternalState::Open) | Some(ChangesetExternalState::Draft)
        )
    }
}

/// Desired-state description for one changeset: branch, diff, and
/// publication intent. Tracking specs carry an external id instead of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetSpec {
    pub id: ChangesetSpecId,
    pub batch_spec_id: BatchSpecId,
    pub repo_id: RepoId,
    pub head_ref: String,
    pub title: String,
    pub body: String,
    pub diff: String,
    pub published: Option<PublicationIntent>,
    pub external_id: Option<String>,
}

impl ChangesetSpec {
    /// A tracking spec imports an existing pull request instead of pushing a
    /// branch.
    pub fn is_tracking(&self) -> bool {
        self.external_id.is_some()
    }
}

/// One event in a changeset's timeline (review, comment, state change...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangesetEvent {
    pub id: ChangesetEventId,
    pub changeset_id: ChangesetId,
    pub kind: String,
    pub created_at: i64,
}
