use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use sqlx::{
    Pool, QueryBuilder, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
};
use std::str::FromStr;
use tracing::info;

use crate::model::{
    BatchChange, BatchChangeId, BatchSpec, BatchSpecId, BulkOperation, BulkOperationId,
    BulkOperationState, Changeset, ChangesetEvent, ChangesetEventId, ChangesetExternalState,
    ChangesetId, ChangesetPublicationState, ChangesetSpec, ChangesetSpecId, CodeHost, Credential,
    CredentialId, PublicationIntent, Repo, RepoId, UserId,
};

use super::{
    BatchesStore, ListBatchChangesOpts, ListBatchSpecsOpts, ListBulkOperationsOpts,
    ListChangesetEventsOpts, ListChangesetSpecsOpts, ListChangesetsOpts, SCHEMA_VERSION, Viewer,
};

/// SQLite-backed store for the batch-change domain.
pub struct Database {
    pool: Pool<Sqlite>,
}

/// Truncate a page fetched with `LIMIT limit + 1` down to `limit` rows and
/// compute the continuation offset; 0 means no further page.
fn next_offset<T>(rows: &mut Vec<T>, limit: i64, offset: i64) -> i64 {
    if limit > 0 && rows.len() as i64 > limit {
        rows.truncate(limit as usize);
        offset + limit
    } else {
        0
    }
}

/// Append `LIMIT`/`OFFSET` for the limit-plus-one paging scheme. A limit of
/// 0 means unlimited.
fn push_paging(qb: &mut QueryBuilder<'_, Sqlite>, limit: i64, offset: i64) {
    if limit > 0 {
        qb.push(" LIMIT ");
        qb.push_bind(limit + 1);
        qb.push(" OFFSET ");
        qb.push_bind(offset.max(0));
    } else if offset > 0 {
        qb.push(" LIMIT -1 OFFSET ");
        qb.push_bind(offset);
    }
}

impl Database {
    /// Open (or create) the database at `db_path`; use ":memory:" in tests.
    pub async fn new(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", db_path))?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .pragma("temp_store", "MEMORY")
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Initialize the schema, returns true if it was (re)built.
    pub async fn init_schema(&self) -> Result<bool> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let stored_version: Option<String> =
            sqlx::query("SELECT value FROM metadata WHERE key = 'schema_version'")
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.get("value"));

        let needs_rebuild = stored_version.as_deref() != Some(SCHEMA_VERSION);

        if needs_rebuild {
            if let Some(old) = &stored_version {
                info!(%old, new = SCHEMA_VERSION, "schema version changed, rebuilding");
            }
            for table in [
                "bulk_operations",
                "changeset_events",
                "changeset_specs",
                "changesets",
                "batch_changes",
                "batch_specs",
                "user_credentials",
                "site_credentials",
                "code_hosts",
                "repo_permissions",
                "repos",
            ] {
                sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                    .execute(&self.pool)
                    .await?;
            }
            sqlx::query("DELETE FROM metadata").execute(&self.pool).await?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS repos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                private INTEGER NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS repo_permissions (
                repo_id INTEGER NOT NULL REFERENCES repos(id),
                user_id INTEGER NOT NULL,
                PRIMARY KEY (repo_id, user_id)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS batch_specs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                namespace TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                raw_spec TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS batch_changes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                namespace TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                creator_id INTEGER NOT NULL,
                last_applied_at INTEGER NOT NULL,
                closed_at INTEGER,
                batch_spec_id INTEGER NOT NULL REFERENCES batch_specs(id),
                UNIQUE (namespace, name)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS changesets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_id INTEGER NOT NULL REFERENCES repos(id),
                batch_change_id INTEGER,
                owned_by_batch_change_id INTEGER,
                current_spec_id INTEGER,
                external_id TEXT,
                head_ref TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                diff TEXT NOT NULL DEFAULT '',
                publication_state TEXT NOT NULL,
                external_state TEXT,
                next_sync_at INTEGER
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS changeset_specs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_spec_id INTEGER NOT NULL REFERENCES batch_specs(id),
                repo_id INTEGER NOT NULL REFERENCES repos(id),
                head_ref TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                body TEXT NOT NULL DEFAULT '',
                diff TEXT NOT NULL DEFAULT '',
                published TEXT,
                external_id TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS changeset_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                changeset_id INTEGER NOT NULL REFERENCES changesets(id),
                kind TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bulk_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_change_id INTEGER NOT NULL REFERENCES batch_changes(id),
                user_id INTEGER NOT NULL,
                op_type TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS code_hosts (
                external_service_id TEXT NOT NULL,
                external_service_type TEXT NOT NULL,
                url TEXT NOT NULL,
                PRIMARY KEY (external_service_id, external_service_type)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user_credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                external_service_id TEXT NOT NULL,
                external_service_type TEXT NOT NULL,
                token TEXT NOT NULL,
                UNIQUE (user_id, external_service_id, external_service_type)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS site_credentials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_service_id TEXT NOT NULL,
                external_service_type TEXT NOT NULL,
                token TEXT NOT NULL,
                UNIQUE (external_service_id, external_service_type)
            )",
        )
        .execute(&self.pool)
        .await?;

        if needs_rebuild {
            sqlx::query("INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)")
                .bind(SCHEMA_VERSION)
                .execute(&self.pool)
                .await?;
        }

        Ok(needs_rebuild)
    }

    // --- insert helpers (used by seeding and tests) ---

    pub async fn create_repo(&self, name: &str, private: bool) -> Result<Repo> {
        let res = sqlx::query("INSERT INTO repos (name, private) VALUES (?, ?)")
            .bind(name)
            .bind(private as i64)
            .execute(&self.pool)
            .await?;
        Ok(Repo { id: res.last_insert_rowid(), name: name.to_string(), private })
    }

    pub async fn grant_repo_permission(&self, repo_id: RepoId, user_id: UserId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO repo_permissions (repo_id, user_id) VALUES (?, ?)")
            .bind(repo_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_batch_spec(&self, spec: &BatchSpec) -> Result<BatchSpecId> {
        let res = sqlx::query(
            "INSERT INTO batch_specs (namespace, user_id, raw_spec, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&spec.namespace)
        .bind(spec.user_id)
        .bind(&spec.raw_spec)
        .bind(spec.created_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn create_batch_change(&self, bc: &BatchChange) -> Result<BatchChangeId> {
        let res = sqlx::query(
            "INSERT INTO batch_changes
                (name, namespace, description, creator_id, last_applied_at, closed_at, batch_spec_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&bc.name)
        .bind(&bc.namespace)
        .bind(&bc.description)
        .bind(bc.creator_id)
        .bind(bc.last_applied_at)
        .bind(bc.closed_at)
        .bind(bc.batch_spec_id)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Point an existing batch change at a newer spec and bump its apply time.
    pub async fn apply_batch_spec(
        &self,
        batch_change_id: BatchChangeId,
        batch_spec_id: BatchSpecId,
        applied_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE batch_changes SET batch_spec_id = ?, last_applied_at = ? WHERE id = ?",
        )
        .bind(batch_spec_id)
        .bind(applied_at)
        .bind(batch_change_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_changeset(&self, cs: &Changeset) -> Result<ChangesetId> {
        let res = sqlx::query(
            "INSERT INTO changesets
                (repo_id, batch_change_id, owned_by_batch_change_id, current_spec_id,
                 external_id, head_ref, title, body, diff,
                 publication_state, external_state, next_sync_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(cs.repo_id)
        .bind(cs.batch_change_id)
        .bind(cs.owned_by_batch_change_id)
        .bind(cs.current_spec_id)
        .bind(&cs.external_id)
        .bind(&cs.head_ref)
        .bind(&cs.title)
        .bind(&cs.body)
        .bind(&cs.diff)
        .bind(cs.publication_state.as_str())
        .bind(cs.external_state.map(|s| s.as_str()))
        .bind(cs.next_sync_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn create_changeset_spec(&self, spec: &ChangesetSpec) -> Result<ChangesetSpecId> {
        let res = sqlx::query(
            "INSERT INTO changeset_specs
                (batch_spec_id, repo_id, head_ref, title, body, diff, published, external_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(spec.batch_spec_id)
        .bind(spec.repo_id)
        .bind(&spec.head_ref)
        .bind(&spec.title)
        .bind(&spec.body)
        .bind(&spec.diff)
        .bind(spec.published.map(|p| p.as_str()))
        .bind(&spec.external_id)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn create_changeset_event(&self, ev: &ChangesetEvent) -> Result<ChangesetEventId> {
        let res = sqlx::query(
            "INSERT INTO changeset_events (changeset_id, kind, created_at) VALUES (?, ?, ?)",
        )
        .bind(ev.changeset_id)
        .bind(&ev.kind)
        .bind(ev.created_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn create_bulk_operation(&self, op: &BulkOperation) -> Result<BulkOperationId> {
        let res = sqlx::query(
            "INSERT INTO bulk_operations (batch_change_id, user_id, op_type, state, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(op.batch_change_id)
        .bind(op.user_id)
        .bind(&op.op_type)
        .bind(op.state.as_str())
        .bind(op.created_at)
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    pub async fn create_code_host(&self, host: &CodeHost) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO code_hosts (external_service_id, external_service_type, url)
             VALUES (?, ?, ?)",
        )
        .bind(&host.external_service_id)
        .bind(&host.external_service_type)
        .bind(&host.url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn create_credential(&self, cred: &Credential) -> Result<CredentialId> {
        let res = if let Some(user_id) = cred.user_id {
            sqlx::query(
                "INSERT INTO user_credentials (user_id, external_service_id, external_service_type, token)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(user_id)
            .bind(&cred.external_service_id)
            .bind(&cred.external_service_type)
            .bind(&cred.token)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "INSERT INTO site_credentials (external_service_id, external_service_type, token)
                 VALUES (?, ?, ?)",
            )
            .bind(&cred.external_service_id)
            .bind(&cred.external_service_type)
            .bind(&cred.token)
            .execute(&self.pool)
            .await?
        };
        Ok(res.last_insert_rowid())
    }

    // --- row decoding ---

    fn row_to_batch_change(row: &SqliteRow) -> BatchChange {
        BatchChange {
            id: row.get("id"),
            name: row.get("name"),
            namespace: row.get("namespace"),
            description: row.get("description"),
            creator_id: row.get("creator_id"),
            last_applied_at: row.get("last_applied_at"),
            closed_at: row.get("closed_at"),
            batch_spec_id: row.get("batch_spec_id"),
        }
    }

    fn row_to_batch_spec(row: &SqliteRow) -> BatchSpec {
        BatchSpec {
            id: row.get("id"),
            namespace: row.get("namespace"),
            user_id: row.get("user_id"),
            raw_spec: row.get("raw_spec"),
            created_at: row.get("created_at"),
        }
    }

    fn row_to_changeset(row: &SqliteRow) -> Result<Changeset> {
        let publication_state: String = row.get("publication_state");
        let external_state: Option<String> = row.get("external_state");
        Ok(Changeset {
            id: row.get("id"),
            repo_id: row.get("repo_id"),
            batch_change_id: row.get("batch_change_id"),
            owned_by_batch_change_id: row.get("owned_by_batch_change_id"),
            current_spec_id: row.get("current_spec_id"),
            external_id: row.get("external_id"),
            head_ref: row.get("head_ref"),
            title: row.get("title"),
            body: row.get("body"),
            diff: row.get("diff"),
            publication_state: ChangesetPublicationState::parse(&publication_state)
                .ok_or_else(|| anyhow!("unknown publication state: {publication_state}"))?,
            external_state: external_state
                .map(|s| {
                    ChangesetExternalState::parse(&s)
                        .ok_or_else(|| anyhow!("unknown external state: {s}"))
                })
                .transpose()?,
            next_sync_at: row.get("next_sync_at"),
        })
    }

    fn row_to_changeset_spec(row: &SqliteRow) -> Result<ChangesetSpec> {
        let published: Option<String> = row.get("published");
        Ok(ChangesetSpec {
            id: row.get("id"),
            batch_spec_id: row.get("batch_spec_id"),
            repo_id: row.get("repo_id"),
            head_ref: row.get("head_ref"),
            title: row.get("title"),
            body: row.get("body"),
            diff: row.get("diff"),
            published: published
                .map(|s| {
                    PublicationIntent::parse(&s)
                        .ok_or_else(|| anyhow!("unknown publication intent: {s}"))
                })
                .transpose()?,
            external_id: row.get("external_id"),
        })
    }

    // --- shared filter fragments ---

    fn batch_change_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, opts: &'a ListBatchChangesOpts) {
        if let Some(namespace) = &opts.namespace {
            qb.push(" AND namespace = ");
            qb.push_bind(namespace);
        }
        if opts.open_only {
            qb.push(" AND closed_at IS NULL");
        }
    }

    fn changeset_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, opts: &'a ListChangesetsOpts) {
        if let Some(id) = opts.batch_change_id {
            qb.push(" AND batch_change_id = ");
            qb.push_bind(id);
        }
        if let Some(state) = opts.publication_state {
            qb.push(" AND publication_state = ");
            qb.push_bind(state.as_str());
        }
        if let Some(state) = opts.external_state {
            qb.push(" AND external_state = ");
            qb.push_bind(state.as_str());
        }
        if let Some(text) = &opts.text_search {
            qb.push(" AND title LIKE '%' || ");
            qb.push_bind(text);
            qb.push(" || '%'");
        }
        if !opts.repo_ids.is_empty() {
            qb.push(" AND repo_id IN (");
            let mut ids = qb.separated(", ");
            for id in &opts.repo_ids {
                ids.push_bind(*id);
            }
            qb.push(")");
        }
        if let Some(viewer) = &opts.viewer {
            if !viewer.site_admin {
                qb.push(
                    " AND repo_id IN (SELECT r.id FROM repos r WHERE r.private = 0 \
                       OR EXISTS (SELECT 1 FROM repo_permissions p \
                                  WHERE p.repo_id = r.id AND p.user_id = ",
                );
                qb.push_bind(viewer.user_id);
                qb.push("))");
            }
        }
    }

    async fn count_where(&self, mut qb: QueryBuilder<'_, Sqlite>) -> Result<i64> {
        let row = qb.build().fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>(0))
    }
}

#[async_trait]
impl BatchesStore for Database {
    async fn get_batch_change_by_namespace_and_name(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BatchChange>> {
        let row = sqlx::query("SELECT * FROM batch_changes WHERE namespace = ? AND name = ?")
            .bind(namespace)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_batch_change))
    }

    async fn get_batch_change(&self, id: BatchChangeId) -> Result<Option<BatchChange>> {
        let row = sqlx::query("SELECT * FROM batch_changes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_batch_change))
    }

    async fn get_batch_spec(&self, id: BatchSpecId) -> Result<Option<BatchSpec>> {
        let row = sqlx::query("SELECT * FROM batch_specs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_batch_spec))
    }

    async fn list_batch_changes(
        &self,
        opts: &ListBatchChangesOpts,
    ) -> Result<(Vec<BatchChange>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM batch_changes WHERE 1=1");
        Self::batch_change_filters(&mut qb, opts);
        // Most recently applied first; id breaks ties for a stable order.
        qb.push(" ORDER BY last_applied_at DESC, id DESC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items: Vec<_> = rows.iter().map(Self::row_to_batch_change).collect();
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_batch_changes(&self, opts: &ListBatchChangesOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM batch_changes WHERE 1=1");
        Self::batch_change_filters(&mut qb, opts);
        self.count_where(qb).await
    }

    async fn list_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<(Vec<BatchSpec>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM batch_specs WHERE 1=1");
        if let Some(namespace) = &opts.namespace {
            qb.push(" AND namespace = ");
            qb.push_bind(namespace);
        }
        qb.push(" ORDER BY created_at DESC, id DESC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items: Vec<_> = rows.iter().map(Self::row_to_batch_spec).collect();
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_batch_specs(&self, opts: &ListBatchSpecsOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM batch_specs WHERE 1=1");
        if let Some(namespace) = &opts.namespace {
            qb.push(" AND namespace = ");
            qb.push_bind(namespace);
        }
        self.count_where(qb).await
    }

    async fn list_changesets(&self, opts: &ListChangesetsOpts) -> Result<(Vec<Changeset>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM changesets WHERE 1=1");
        Self::changeset_filters(&mut qb, opts);
        qb.push(" ORDER BY id ASC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = rows
            .iter()
            .map(Self::row_to_changeset)
            .collect::<Result<Vec<_>>>()?;
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_changesets(&self, opts: &ListChangesetsOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM changesets WHERE 1=1");
        Self::changeset_filters(&mut qb, opts);
        self.count_where(qb).await
    }

    async fn list_changeset_specs(
        &self,
        opts: &ListChangesetSpecsOpts,
    ) -> Result<(Vec<ChangesetSpec>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM changeset_specs WHERE 1=1");
        if let Some(id) = opts.batch_spec_id {
            qb.push(" AND batch_spec_id = ");
            qb.push_bind(id);
        }
        qb.push(" ORDER BY id ASC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = rows
            .iter()
            .map(Self::row_to_changeset_spec)
            .collect::<Result<Vec<_>>>()?;
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_changeset_specs(&self, opts: &ListChangesetSpecsOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM changeset_specs WHERE 1=1");
        if let Some(id) = opts.batch_spec_id {
            qb.push(" AND batch_spec_id = ");
            qb.push_bind(id);
        }
        self.count_where(qb).await
    }

    async fn list_changeset_events(
        &self,
        opts: &ListChangesetEventsOpts,
    ) -> Result<(Vec<ChangesetEvent>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM changeset_events WHERE 1=1");
        if let Some(id) = opts.changeset_id {
            qb.push(" AND changeset_id = ");
            qb.push_bind(id);
        }
        qb.push(" ORDER BY id ASC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items: Vec<_> = rows
            .iter()
            .map(|row| ChangesetEvent {
                id: row.get("id"),
                changeset_id: row.get("changeset_id"),
                kind: row.get("kind"),
                created_at: row.get("created_at"),
            })
            .collect();
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_changeset_events(&self, opts: &ListChangesetEventsOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM changeset_events WHERE 1=1");
        if let Some(id) = opts.changeset_id {
            qb.push(" AND changeset_id = ");
            qb.push_bind(id);
        }
        self.count_where(qb).await
    }

    async fn list_bulk_operations(
        &self,
        opts: &ListBulkOperationsOpts,
    ) -> Result<(Vec<BulkOperation>, i64)> {
        let mut qb = QueryBuilder::new("SELECT * FROM bulk_operations WHERE 1=1");
        if let Some(id) = opts.batch_change_id {
            qb.push(" AND batch_change_id = ");
            qb.push_bind(id);
        }
        qb.push(" ORDER BY id ASC");
        push_paging(&mut qb, opts.limit, opts.offset);

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut items = rows
            .iter()
            .map(|row| {
                let state: String = row.get("state");
                Ok(BulkOperation {
                    id: row.get("id"),
                    batch_change_id: row.get("batch_change_id"),
                    user_id: row.get("user_id"),
                    op_type: row.get("op_type"),
                    state: BulkOperationState::parse(&state)
                        .ok_or_else(|| anyhow!("unknown bulk operation state: {state}"))?,
                    created_at: row.get("created_at"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let next = next_offset(&mut items, opts.limit, opts.offset);
        Ok((items, next))
    }

    async fn count_bulk_operations(&self, opts: &ListBulkOperationsOpts) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM bulk_operations WHERE 1=1");
        if let Some(id) = opts.batch_change_id {
            qb.push(" AND batch_change_id = ");
            qb.push_bind(id);
        }
        self.count_where(qb).await
    }

    async fn list_code_hosts(&self) -> Result<Vec<CodeHost>> {
        let rows = sqlx::query(
            "SELECT * FROM code_hosts ORDER BY external_service_type ASC, external_service_id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| CodeHost {
                external_service_id: row.get("external_service_id"),
                external_service_type: row.get("external_service_type"),
                url: row.get("url"),
            })
            .collect())
    }

    async fn list_user_credentials(&self, user_id: UserId) -> Result<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM user_credentials WHERE user_id = ? ORDER BY id ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Credential {
                id: row.get("id"),
                user_id: Some(row.get("user_id")),
                external_service_id: row.get("external_service_id"),
                external_service_type: row.get("external_service_type"),
                token: row.get("token"),
            })
            .collect())
    }

    async fn list_site_credentials(&self) -> Result<Vec<Credential>> {
        let rows = sqlx::query("SELECT * FROM site_credentials ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(|row| Credential {
                id: row.get("id"),
                user_id: None,
                external_service_id: row.get("external_service_id"),
                external_service_type: row.get("external_service_type"),
                token: row.get("token"),
            })
            .collect())
    }

    async fn visible_repos(&self, viewer: &Viewer, repo_ids: &[RepoId]) -> Result<Vec<Repo>> {
        if repo_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new("SELECT * FROM repos r WHERE r.id IN (");
        let mut ids = qb.separated(", ");
        for id in repo_ids {
            ids.push_bind(*id);
        }
        qb.push(")");
        if !viewer.site_admin {
            qb.push(
                " AND (r.private = 0 OR EXISTS \
                   (SELECT 1 FROM repo_permissions p \
                    WHERE p.repo_id = r.id AND p.user_id = ",
            );
            qb.push_bind(viewer.user_id);
            qb.push("))");
        }
        qb.push(" ORDER BY r.id ASC");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| Repo {
                id: row.get("id"),
                name: row.get("name"),
                private: row.get::<i64, _>("private") != 0,
            })
            .collect())
    }

    async fn changeset_next_sync(
        &self,
        ids: &[ChangesetId],
    ) -> Result<Vec<(ChangesetId, i64)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(
            "SELECT id, next_sync_at FROM changesets WHERE next_sync_at IS NOT NULL AND id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(*id);
        }
        qb.push(")");

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<i64, _>("id"), row.get::<i64, _>("next_sync_at")))
            .collect())
    }
}
