mod error;
mod model;
mod reconciler;
mod resolvers;
mod rewirer;
mod store;
mod util;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use model::{
    BatchChange, BatchSpec, Changeset, ChangesetPublicationState, ChangesetSpec, CodeHost,
    Credential, PublicationIntent,
};
use reconciler::UiPublicationStates;
use resolvers::{
    ApplyPreviewConnection, CodeHostConnection, RewirerMappingsFacade,
    batch_change_by_namespace_and_name, batch_changes_connection, page_args,
};
use store::{BatchesStore, Database, ListBatchChangesOpts, Viewer};
use util::format_timestamp;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let db_path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            let data_dir = dirs::data_dir()
                .context("Could not determine data directory")?
                .join("batchwork");
            fs::create_dir_all(&data_dir)?;
            data_dir
                .join("batchwork.db")
                .to_str()
                .context("Invalid path encoding")?
                .to_string()
        }
    };
    info!(%db_path, "opening store");

    let db = Database::new(&db_path).await?;
    db.init_schema().await?;

    if db.count_batch_changes(&ListBatchChangesOpts::default()).await? == 0 {
        info!("store is empty, seeding demo data");
        seed_demo(&db).await?;
    }

    let store: Arc<dyn BatchesStore> = Arc::new(db);
    let viewer = Viewer { user_id: 1, site_admin: false };

    // Walk the namespace's batch changes one page at a time.
    let mut cursor: Option<String> = None;
    println!("# batch changes in namespace acme");
    loop {
        let (limit, offset) = page_args(1, cursor.as_deref())?;
        let connection = batch_changes_connection(
            store.clone(),
            ListBatchChangesOpts {
                namespace: Some("acme".to_string()),
                limit,
                offset,
                ..Default::default()
            },
        );
        for bc in connection.nodes().await? {
            println!(
                "{}",
                json!({
                    "name": bc.name,
                    "namespace": bc.namespace,
                    "lastApplied": format_timestamp(bc.last_applied_at),
                    "totalCount": connection.total_count().await?,
                })
            );
        }
        let page_info = connection.page_info().await?;
        if !page_info.has_next_page {
            break;
        }
        cursor = page_info.end_cursor;
    }

    // Preview what applying the newest spec would do.
    let batch_change = batch_change_by_namespace_and_name(store.as_ref(), "acme", "update-ci")
        .await?
        .context("demo batch change missing")?;
    let batch_spec_id = batch_change.batch_spec_id;
    let mappings =
        rewirer::rewirer_mappings(store.as_ref(), batch_spec_id, Some(&batch_change), &viewer)
            .await?;
    let facade = Arc::new(RewirerMappingsFacade::new(
        store.clone(),
        mappings,
        batch_spec_id,
        Some(batch_change),
        UiPublicationStates::default(),
    ));

    let preview = ApplyPreviewConnection::new(facade, 10, 0, None);
    println!("# apply preview");
    for node in preview.nodes().await? {
        match node.as_visible() {
            Some(visible) => println!(
                "{}",
                json!({
                    "target": node.target(),
                    "operations": visible.operations().await?,
                    "repo": visible.changeset_spec().map(|s| s.repo_id)
                        .or_else(|| visible.changeset().map(|c| c.repo_id)),
                })
            ),
            None => println!("{}", json!({ "target": node.target(), "hidden": true })),
        }
    }
    println!("# stats\n{}", serde_json::to_string_pretty(&preview.stats().await?)?);

    let code_hosts = CodeHostConnection::new(store.clone(), viewer.user_id, false, 0, 0);
    println!("# code hosts");
    for resolved in code_hosts.nodes().await? {
        println!(
            "{}",
            json!({
                "host": resolved.host.url,
                "credential": resolved.credential.as_ref().map(|c| match c.user_id {
                    Some(_) => "user",
                    None => "site",
                }),
            })
        );
    }

    Ok(())
}

/// Seed a small, self-consistent demo dataset: two applied specs, a changeset
/// in each preview state, a private repo the demo viewer cannot see, and
/// credentials on one of two code hosts.
async fn seed_demo(db: &Database) -> Result<()> {
    let now = 1_755_000_000;

    let repo_a = db.create_repo("github.com/acme/api", false).await?;
    let repo_b = db.create_repo("github.com/acme/web", false).await?;
    let repo_private = db.create_repo("github.com/acme/secrets", true).await?;

    for (esid, esty, url) in [
        ("https://github.com/", "github", "https://github.com"),
        ("https://gitlab.com/", "gitlab", "https://gitlab.com"),
    ] {
        db.create_code_host(&CodeHost {
            external_service_id: esid.to_string(),
            external_service_type: esty.to_string(),
            url: url.to_string(),
        })
        .await?;
    }
    db.create_credential(&Credential {
        id: 0,
        user_id: Some(1),
        external_service_id: "https://github.com/".to_string(),
        external_service_type: "github".to_string(),
        token: "user-token".to_string(),
    })
    .await?;
    db.create_credential(&Credential {
        id: 0,
        user_id: None,
        external_service_id: "https://github.com/".to_string(),
        external_service_type: "github".to_string(),
        token: "site-token".to_string(),
    })
    .await?;

    let old_spec_id = db
        .create_batch_spec(&BatchSpec {
            id: 0,
            namespace: "acme".to_string(),
            user_id: 1,
            raw_spec: "name: update-ci\nversion: 1".to_string(),
            created_at: now - 86_400,
        })
        .await?;
    let new_spec_id = db
        .create_batch_spec(&BatchSpec {
            id: 0,
            namespace: "acme".to_string(),
            user_id: 1,
            raw_spec: "name: update-ci\nversion: 2".to_string(),
            created_at: now,
        })
        .await?;

    let bc_id = db
        .create_batch_change(&BatchChange {
            id: 0,
            name: "update-ci".to_string(),
            namespace: "acme".to_string(),
            description: "Upgrade CI config across services".to_string(),
            creator_id: 1,
            last_applied_at: now,
            closed_at: None,
            batch_spec_id: new_spec_id,
        })
        .await?;
    db.create_batch_change(&BatchChange {
        id: 0,
        name: "remove-flag".to_string(),
        namespace: "acme".to_string(),
        description: "Delete a stale feature flag".to_string(),
        creator_id: 1,
        last_applied_at: now - 3_600,
        closed_at: None,
        batch_spec_id: old_spec_id,
    })
    .await?;

    // One changeset the new spec keeps (with a newer diff), one it drops.
    db.create_changeset(&Changeset {
        id: 0,
        repo_id: repo_a.id,
        batch_change_id: Some(bc_id),
        owned_by_batch_change_id: Some(bc_id),
        current_spec_id: None,
        external_id: Some("101".to_string()),
        head_ref: "refs/heads/update-ci".to_string(),
        title: "Update CI".to_string(),
        body: "".to_string(),
        diff: "diff v1".to_string(),
        publication_state: ChangesetPublicationState::Published,
        external_state: Some(model::ChangesetExternalState::Open),
        next_sync_at: Some(now + 600),
    })
    .await?;
    db.create_changeset(&Changeset {
        id: 0,
        repo_id: repo_private.id,
        batch_change_id: Some(bc_id),
        owned_by_batch_change_id: Some(bc_id),
        current_spec_id: None,
        external_id: None,
        head_ref: "refs/heads/drop-me".to_string(),
        title: "Old changeset".to_string(),
        body: "".to_string(),
        diff: "diff v0".to_string(),
        publication_state: ChangesetPublicationState::Published,
        external_state: Some(model::ChangesetExternalState::Open),
        next_sync_at: None,
    })
    .await?;

    db.create_changeset_spec(&ChangesetSpec {
        id: 0,
        batch_spec_id: new_spec_id,
        repo_id: repo_a.id,
        head_ref: "refs/heads/update-ci".to_string(),
        title: "Update CI".to_string(),
        body: "".to_string(),
        diff: "diff v2".to_string(),
        published: Some(PublicationIntent::Published),
        external_id: None,
    })
    .await?;
    db.create_changeset_spec(&ChangesetSpec {
        id: 0,
        batch_spec_id: new_spec_id,
        repo_id: repo_b.id,
        head_ref: "refs/heads/update-ci".to_string(),
        title: "Update CI".to_string(),
        body: "".to_string(),
        diff: "diff v2".to_string(),
        published: Some(PublicationIntent::Draft),
        external_id: None,
    })
    .await?;

    Ok(())
}
