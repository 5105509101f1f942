// Store integration tests: schema lifecycle, stable orderings, the
// limit-plus-one paging contract, filter/count symmetry, and the repo
// permission predicate.

mod common;

use batchwork::model::{ChangesetEvent, ChangesetPublicationState};
use batchwork::store::{
    BatchesStore, Database, ListBatchChangesOpts, ListChangesetEventsOpts, ListChangesetsOpts,
    Viewer,
};

#[tokio::test]
async fn test_schema_init() {
    let db = Database::new(":memory:").await.unwrap();

    // First init should return true (schema was created)
    let rebuilt = db.init_schema().await.unwrap();
    assert!(rebuilt, "First init_schema should return true");

    // Second init should return false (schema exists and version matches)
    let rebuilt = db.init_schema().await.unwrap();
    assert!(!rebuilt, "Second init_schema should return false");
}

#[tokio::test]
async fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("batches.db");
    let path = path.to_str().unwrap();

    {
        let db = Database::new(path).await.unwrap();
        db.init_schema().await.unwrap();
        let spec = common::create_batch_spec(&db, "acme", 1).await;
        common::create_batch_change(&db, "acme", "bc", spec, 1).await;
    }

    let db = Database::new(path).await.unwrap();
    assert!(!db.init_schema().await.unwrap());
    assert_eq!(
        db.count_batch_changes(&ListBatchChangesOpts::default())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn batch_changes_are_ordered_by_apply_time_desc() {
    let db = common::create_test_db().await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    common::create_batch_change(&db, "acme", "a", spec, 100).await;
    common::create_batch_change(&db, "acme", "b", spec, 300).await;
    common::create_batch_change(&db, "acme", "c", spec, 200).await;

    let (items, next) = db
        .list_batch_changes(&ListBatchChangesOpts::default())
        .await
        .unwrap();
    let names: Vec<_> = items.into_iter().map(|bc| bc.name).collect();
    assert_eq!(names, vec!["b", "c", "a"]);
    assert_eq!(next, 0);
}

#[tokio::test]
async fn list_returns_next_offset_only_when_more_rows_exist() {
    let db = common::create_test_db().await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    for i in 0..5 {
        common::create_batch_change(&db, "acme", &format!("bc-{i}"), spec, i).await;
    }

    let opts = |limit, offset| ListBatchChangesOpts { limit, offset, ..Default::default() };

    let (items, next) = db.list_batch_changes(&opts(2, 0)).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(next, 2);

    let (items, next) = db.list_batch_changes(&opts(2, 2)).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(next, 4);

    // The final, short page reports no continuation.
    let (items, next) = db.list_batch_changes(&opts(2, 4)).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(next, 0);

    // An exactly-full final page also reports no continuation.
    let (items, next) = db.list_batch_changes(&opts(5, 0)).await.unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(next, 0);
}

#[tokio::test]
async fn count_mirrors_list_filters() {
    let db = common::create_test_db().await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    let other = common::create_batch_spec(&db, "other", 1).await;
    common::create_batch_change(&db, "acme", "a", spec, 1).await;
    common::create_batch_change(&db, "acme", "b", spec, 2).await;
    common::create_batch_change(&db, "other", "c", other, 3).await;

    let acme = ListBatchChangesOpts {
        namespace: Some("acme".to_string()),
        // A count must ignore paging fields entirely.
        limit: 1,
        ..Default::default()
    };
    assert_eq!(db.count_batch_changes(&acme).await.unwrap(), 2);
    assert_eq!(
        db.count_batch_changes(&ListBatchChangesOpts::default())
            .await
            .unwrap(),
        3
    );
}

#[tokio::test]
async fn changeset_filters_and_authz() {
    let db = common::create_test_db().await;
    let public = common::create_repo(&db, "public", false).await;
    let private = common::create_repo(&db, "private", true).await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    let bc = common::create_batch_change(&db, "acme", "bc", spec, 1).await;

    db.create_changeset(&common::changeset(public.id, bc, "refs/heads/a"))
        .await
        .unwrap();
    let mut hidden = common::changeset(private.id, bc, "refs/heads/b");
    hidden.title = "Secret change".to_string();
    db.create_changeset(&hidden).await.unwrap();

    let all = ListChangesetsOpts { batch_change_id: Some(bc), ..Default::default() };
    assert_eq!(db.count_changesets(&all).await.unwrap(), 2);

    // Repo permissions hide the private repo's changeset from the viewer.
    let viewer = Viewer { user_id: 7, site_admin: false };
    let enforced = ListChangesetsOpts {
        batch_change_id: Some(bc),
        viewer: Some(viewer),
        ..Default::default()
    };
    assert_eq!(db.count_changesets(&enforced).await.unwrap(), 1);

    db.grant_repo_permission(private.id, 7).await.unwrap();
    assert_eq!(db.count_changesets(&enforced).await.unwrap(), 2);

    // Site admins bypass the permission check.
    let admin = ListChangesetsOpts {
        batch_change_id: Some(bc),
        viewer: Some(Viewer { user_id: 99, site_admin: true }),
        ..Default::default()
    };
    assert_eq!(db.count_changesets(&admin).await.unwrap(), 2);

    // Text search and publication state compose with the rest.
    let text = ListChangesetsOpts {
        batch_change_id: Some(bc),
        text_search: Some("Secret".to_string()),
        ..Default::default()
    };
    let (items, _) = db.list_changesets(&text).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "Secret change");

    let published = ListChangesetsOpts {
        batch_change_id: Some(bc),
        publication_state: Some(ChangesetPublicationState::Unpublished),
        ..Default::default()
    };
    assert_eq!(db.count_changesets(&published).await.unwrap(), 0);
}

#[tokio::test]
async fn visible_repos_applies_the_permission_predicate() {
    let db = common::create_test_db().await;
    let public = common::create_repo(&db, "public", false).await;
    let private = common::create_repo(&db, "private", true).await;
    let viewer = Viewer { user_id: 3, site_admin: false };

    let ids = [public.id, private.id];
    let visible = db.visible_repos(&viewer, &ids).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, public.id);

    db.grant_repo_permission(private.id, 3).await.unwrap();
    let visible = db.visible_repos(&viewer, &ids).await.unwrap();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn changeset_next_sync_returns_only_scheduled_ids() {
    let db = common::create_test_db().await;
    let repo = common::create_repo(&db, "r", false).await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    let bc = common::create_batch_change(&db, "acme", "bc", spec, 1).await;

    let mut scheduled = common::changeset(repo.id, bc, "refs/heads/a");
    scheduled.next_sync_at = Some(9_000);
    let scheduled_id = db.create_changeset(&scheduled).await.unwrap();
    let idle_id = db
        .create_changeset(&common::changeset(repo.id, bc, "refs/heads/b"))
        .await
        .unwrap();

    let times = db
        .changeset_next_sync(&[scheduled_id, idle_id])
        .await
        .unwrap();
    assert_eq!(times, vec![(scheduled_id, 9_000)]);

    assert!(db.changeset_next_sync(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn changeset_events_page_in_id_order() {
    let db = common::create_test_db().await;
    let repo = common::create_repo(&db, "r", false).await;
    let spec = common::create_batch_spec(&db, "acme", 1).await;
    let bc = common::create_batch_change(&db, "acme", "bc", spec, 1).await;
    let cs = db
        .create_changeset(&common::changeset(repo.id, bc, "refs/heads/a"))
        .await
        .unwrap();

    for kind in ["opened", "reviewed", "merged"] {
        db.create_changeset_event(&ChangesetEvent {
            id: 0,
            changeset_id: cs,
            kind: kind.to_string(),
            created_at: 1,
        })
        .await
        .unwrap();
    }

    let opts = ListChangesetEventsOpts { changeset_id: Some(cs), limit: 2, offset: 0 };
    let (events, next) = db.list_changeset_events(&opts).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, "opened");
    assert_eq!(next, 2);
    assert_eq!(db.count_changeset_events(&opts).await.unwrap(), 3);
}
