mod apply_preview;
mod batch_changes;
mod changesets;
mod code_hosts;
mod connection;

pub use apply_preview::{
    ApplyPreviewConnection, ApplyPreviewResolver, ApplyPreviewStats, HiddenApplyPreview,
    PreviewTarget, RewirerMappingsFacade, VisibleApplyPreview,
};
pub use batch_changes::{
    BatchChangesConnection, BatchSpecsConnection, batch_change_by_namespace_and_name,
    batch_changes_connection, batch_specs_connection,
};
pub use changesets::{
    BulkOperationsConnection, ChangesetEventsConnection, ChangesetSpecsConnection,
    ChangesetsConnection, bulk_operations_connection, changeset_events_connection,
    changeset_specs_connection, changesets_connection,
};
pub use code_hosts::{CodeHostConnection, ResolvedCodeHost};
pub use connection::{
    ConnectionLoader, CursorConnection, PageInfo, SharedError, marshal_cursor, page_args,
    unmarshal_cursor,
};
