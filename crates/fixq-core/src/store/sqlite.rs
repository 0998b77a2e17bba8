//! `SQLite` backend for the queue store.
//!
//! One table, `test_queue`, one row per tracked file. Multi-statement
//! operations run inside `pool.begin()` / `commit()`; a dropped transaction
//! rolls back. Group and item dequeues use `DELETE ... RETURNING` so the rows
//! a caller receives are exactly the rows it deleted.

use std::{path::Path, str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

use super::{format_timestamp, parse_timestamp, QueueStore};
use crate::{
    item::{ExecutionGroup, GroupMember, GroupType, QueueItem},
    Error, Result,
};

/// Busy timeout applied to every connection so writers from other processes
/// wait for the lock instead of failing immediately.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, file_path, priority, created_at, last_failure, failure_count, \
                       error_context, group_id, group_type, group_order";

const ORDER_BY: &str = "ORDER BY priority DESC, created_at ASC, id ASC";

const CREATE_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS test_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    priority INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    failure_count INTEGER NOT NULL DEFAULT 1,
    last_failure TEXT,
    error_context TEXT,
    group_id INTEGER,
    group_type TEXT CHECK (group_type IN ('parallel', 'sequential')),
    group_order INTEGER
)";

/// Columns that older databases may lack, with the DDL used to add them.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("priority", "priority INTEGER NOT NULL DEFAULT 0"),
    ("failure_count", "failure_count INTEGER NOT NULL DEFAULT 1"),
    ("last_failure", "last_failure TEXT"),
    ("error_context", "error_context TEXT"),
    ("group_id", "group_id INTEGER"),
    (
        "group_type",
        "group_type TEXT CHECK (group_type IN ('parallel', 'sequential'))",
    ),
    ("group_order", "group_order INTEGER"),
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_test_queue_priority_created \
     ON test_queue(priority DESC, created_at ASC)",
    "CREATE INDEX IF NOT EXISTS idx_test_queue_group ON test_queue(group_id, group_order)",
];

const CLEAR_GROUP_FIELDS: &str = "UPDATE test_queue \
     SET group_id = NULL, group_type = NULL, group_order = NULL \
     WHERE group_id IS NOT NULL OR group_type IS NOT NULL OR group_order IS NOT NULL";

type Tx<'c> = sqlx::Transaction<'c, sqlx::Sqlite>;

/// A row of `test_queue` as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
struct QueueRow {
    id: i64,
    file_path: String,
    priority: i64,
    created_at: String,
    last_failure: Option<String>,
    failure_count: i64,
    error_context: Option<String>,
    group_id: Option<i64>,
    group_type: Option<String>,
    group_order: Option<i64>,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = Error;

    fn try_from(row: QueueRow) -> Result<Self> {
        let created_at = parse_timestamp(&row.created_at)?;
        let last_failure = row
            .last_failure
            .as_deref()
            .map(parse_timestamp)
            .transpose()?
            .unwrap_or(created_at);
        let group_type = row.group_type.as_deref().map(parse_group_type).transpose()?;
        Ok(Self {
            id: row.id,
            file_path: row.file_path,
            priority: row.priority,
            created_at,
            last_failure,
            failure_count: row.failure_count,
            error_context: row.error_context,
            group_id: row.group_id,
            group_type,
            group_order: row.group_order,
        })
    }
}

fn parse_group_type(raw: &str) -> Result<GroupType> {
    GroupType::from_str(raw).map_err(|e| Error::Parse(format!("Invalid group type '{raw}': {e}")))
}

fn into_items(rows: Vec<QueueRow>) -> Result<Vec<QueueItem>> {
    rows.into_iter().map(QueueItem::try_from).collect()
}

fn select_sql(tail: &str) -> String {
    format!("SELECT {COLUMNS} FROM test_queue {tail}")
}

/// Durable queue store backed by a single `SQLite` file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    ///
    /// Missing parent directories are created. Existing rows are never touched
    /// by the migration, which only adds columns and indexes.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Io(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| Error::storage(&format!("open {}", path.display()), e))?;

        tracing::debug!(path = %path.display(), "opened queue database");
        Self::with_pool(pool).await
    }

    /// Open a private in-memory database.
    ///
    /// The pool holds exactly one connection that never expires, so the
    /// database lives as long as the store.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| Error::storage("open in-memory database", e))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| Error::storage("open in-memory database", e))?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool and initialize the schema on it.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Get the database pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    async fn begin(&self, operation: &str) -> Result<Tx<'static>> {
        self.ensure_open()?;
        self.pool
            .begin()
            .await
            .map_err(|e| Error::storage(&format!("begin {operation}"), e))
    }

    async fn commit(tx: Tx<'_>, operation: &str) -> Result<()> {
        tx.commit()
            .await
            .map_err(|e| Error::storage(&format!("commit {operation}"), e))
    }

    /// Create the table if absent, add columns missing from older files, then
    /// create indexes. Runs as one transaction.
    async fn init_schema(&self) -> Result<()> {
        let mut tx = self.begin("schema initialization").await?;

        sqlx::query(CREATE_TABLE)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage("create test_queue", e))?;

        let existing: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM pragma_table_info('test_queue')")
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| Error::storage("inspect test_queue columns", e))?;

        for (column, ddl) in ADDITIVE_COLUMNS {
            if existing.iter().any(|(name,)| name == column) {
                continue;
            }
            tracing::info!(column, "adding missing column to test_queue");
            sqlx::query(&format!("ALTER TABLE test_queue ADD COLUMN {ddl}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::storage(&format!("add column {column}"), e))?;
        }

        sqlx::query("UPDATE test_queue SET last_failure = created_at WHERE last_failure IS NULL")
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage("backfill last_failure", e))?;

        for ddl in CREATE_INDEXES {
            sqlx::query(ddl)
                .execute(&mut *tx)
                .await
                .map_err(|e| Error::storage("create index", e))?;
        }

        Self::commit(tx, "schema initialization").await
    }

    async fn write_members(tx: &mut Tx<'_>, members: &[GroupMember]) -> Result<Vec<String>> {
        let mut missing = Vec::new();
        // Sequential awaits: every update must run on the same transaction.
        for member in members {
            let result = sqlx::query(
                "UPDATE test_queue SET group_id = ?1, group_type = ?2, group_order = ?3 \
                 WHERE file_path = ?4",
            )
            .bind(member.group_id)
            .bind(member.group_type.to_string())
            .bind(member.group_order)
            .bind(&member.file_path)
            .execute(&mut **tx)
            .await
            .map_err(|e| Error::storage("assign group", e))?;
            if result.rows_affected() == 0 {
                missing.push(member.file_path.clone());
            }
        }
        Ok(missing)
    }

    /// Insert or merge one failure. A new row starts at `carried + 1`; an
    /// existing row ends at `max(failure_count + 1, carried + 1)`.
    async fn merge_failure(
        &self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
        carried: i64,
        now: DateTime<Utc>,
        operation: &str,
    ) -> Result<QueueItem> {
        self.ensure_open()?;
        let sql = format!(
            "INSERT INTO test_queue \
                 (file_path, priority, created_at, last_failure, failure_count, error_context) \
             VALUES (?1, ?2, ?3, ?3, ?5 + 1, ?4) \
             ON CONFLICT(file_path) DO UPDATE SET \
                 failure_count = MAX(test_queue.failure_count + 1, excluded.failure_count), \
                 last_failure = excluded.last_failure, \
                 priority = MAX(test_queue.priority, excluded.priority), \
                 error_context = COALESCE(excluded.error_context, test_queue.error_context) \
             RETURNING {COLUMNS}"
        );
        let row: QueueRow = sqlx::query_as(&sql)
            .bind(file_path)
            .bind(priority)
            .bind(format_timestamp(now))
            .bind(error_context)
            .bind(carried.max(0))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::storage(operation, e))?;
        QueueItem::try_from(row)
    }

    async fn lowest_group_id(tx: &mut Tx<'_>) -> Result<Option<i64>> {
        sqlx::query_scalar::<_, Option<i64>>(
            "SELECT MIN(group_id) FROM test_queue WHERE group_id IS NOT NULL",
        )
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| Error::storage("resolve next group", e))
    }
}

/// Build an [`ExecutionGroup`] from `(file_path, group_type, group_order, id)` rows.
fn assemble_group(
    group_id: i64,
    mut rows: Vec<(String, Option<String>, Option<i64>, i64)>,
) -> Result<Option<ExecutionGroup>> {
    if rows.is_empty() {
        return Ok(None);
    }
    rows.sort_by_key(|(_, _, order, id)| (*order, *id));
    let group_type = match rows.iter().find_map(|(_, kind, _, _)| kind.as_deref()) {
        Some(raw) => parse_group_type(raw)?,
        None => GroupType::for_size(rows.len()),
    };
    Ok(Some(ExecutionGroup {
        group_id,
        group_type,
        members: rows.into_iter().map(|(path, _, _, _)| path).collect(),
    }))
}

#[async_trait::async_trait]
impl QueueStore for SqliteStore {
    async fn upsert(
        &self,
        file_path: &str,
        priority: i64,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem> {
        self.merge_failure(file_path, priority, error_context, 0, now, "enqueue")
            .await
    }

    async fn requeue(
        &self,
        item: &QueueItem,
        error_context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<QueueItem> {
        self.merge_failure(
            &item.file_path,
            item.priority,
            error_context,
            item.failure_count,
            now,
            "requeue",
        )
        .await
    }

    async fn get(&self, file_path: &str) -> Result<Option<QueueItem>> {
        self.ensure_open()?;
        let sql = select_sql("WHERE file_path = ?1");
        let row: Option<QueueRow> = sqlx::query_as(&sql)
            .bind(file_path)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::storage("get", e))?;
        row.map(QueueItem::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<QueueItem>> {
        self.ensure_open()?;
        let sql = select_sql(ORDER_BY);
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage("list", e))?;
        into_items(rows)
    }

    async fn search(&self, pattern: &str) -> Result<Vec<QueueItem>> {
        self.ensure_open()?;
        // instr() keeps the match literal and case-sensitive, unlike LIKE.
        let sql = select_sql(&format!("WHERE instr(file_path, ?1) > 0 {ORDER_BY}"));
        let rows: Vec<QueueRow> = sqlx::query_as(&sql)
            .bind(pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage("search", e))?;
        into_items(rows)
    }

    async fn peek_next(&self) -> Result<Option<QueueItem>> {
        self.ensure_open()?;
        let sql = select_sql(&format!("{ORDER_BY} LIMIT 1"));
        let row: Option<QueueRow> = sqlx::query_as(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::storage("peek", e))?;
        row.map(QueueItem::try_from).transpose()
    }

    async fn take_next(&self) -> Result<Option<QueueItem>> {
        let mut tx = self.begin("dequeue").await?;
        let sql = format!(
            "DELETE FROM test_queue \
             WHERE id = (SELECT id FROM test_queue {ORDER_BY} LIMIT 1) \
             RETURNING {COLUMNS}"
        );
        let row: Option<QueueRow> = sqlx::query_as(&sql)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| Error::storage("dequeue", e))?;
        let item = row.map(QueueItem::try_from).transpose()?;
        Self::commit(tx, "dequeue").await?;
        Ok(item)
    }

    async fn remove(&self, file_path: &str) -> Result<bool> {
        self.ensure_open()?;
        let result = sqlx::query("DELETE FROM test_queue WHERE file_path = ?1")
            .bind(file_path)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::storage("remove", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> Result<u64> {
        self.ensure_open()?;
        sqlx::query("DELETE FROM test_queue")
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| Error::storage("clear", e))
    }

    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    async fn count(&self) -> Result<usize> {
        self.ensure_open()?;
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM test_queue")
            .fetch_one(&self.pool)
            .await
            .map(|count| count as usize)
            .map_err(|e| Error::storage("count", e))
    }

    async fn replace_groups(&self, members: &[GroupMember]) -> Result<Vec<String>> {
        let mut tx = self.begin("set execution groups").await?;
        sqlx::query(CLEAR_GROUP_FIELDS)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage("reset groups", e))?;
        let missing = Self::write_members(&mut tx, members).await?;
        Self::commit(tx, "set execution groups").await?;
        Ok(missing)
    }

    async fn merge_groups(
        &self,
        group_ids: &[i64],
        members: &[GroupMember],
    ) -> Result<Vec<String>> {
        let mut tx = self.begin("set execution groups").await?;
        for group_id in group_ids {
            sqlx::query(
                "UPDATE test_queue SET group_id = NULL, group_type = NULL, group_order = NULL \
                 WHERE group_id = ?1",
            )
            .bind(group_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage("reset group", e))?;
        }
        let missing = Self::write_members(&mut tx, members).await?;
        Self::commit(tx, "set execution groups").await?;
        Ok(missing)
    }

    async fn clear_groups(&self) -> Result<u64> {
        self.ensure_open()?;
        sqlx::query(CLEAR_GROUP_FIELDS)
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| Error::storage("clear groups", e))
    }

    async fn peek_group(&self) -> Result<Option<ExecutionGroup>> {
        // Read both statements from one snapshot; the transaction is rolled back on drop.
        let mut tx = self.begin("peek group").await?;
        let Some(group_id) = Self::lowest_group_id(&mut tx).await? else {
            return Ok(None);
        };
        let rows: Vec<(String, Option<String>, Option<i64>, i64)> = sqlx::query_as(
            "SELECT file_path, group_type, group_order, id FROM test_queue WHERE group_id = ?1",
        )
        .bind(group_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::storage("peek group", e))?;
        assemble_group(group_id, rows)
    }

    async fn take_group(&self) -> Result<Option<ExecutionGroup>> {
        // One statement: the write lock is taken before the group is resolved.
        let mut tx = self.begin("dequeue group").await?;
        let rows: Vec<(String, Option<String>, Option<i64>, i64, i64)> = sqlx::query_as(
            "DELETE FROM test_queue WHERE group_id = \
                 (SELECT MIN(group_id) FROM test_queue WHERE group_id IS NOT NULL) \
             RETURNING file_path, group_type, group_order, id, group_id",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| Error::storage("dequeue group", e))?;
        let group = match rows.first().map(|row| row.4) {
            Some(group_id) => assemble_group(
                group_id,
                rows.into_iter()
                    .map(|(path, kind, order, id, _)| (path, kind, order, id))
                    .collect(),
            )?,
            None => None,
        };
        Self::commit(tx, "dequeue group").await?;
        Ok(group)
    }

    async fn group_types(&self) -> Result<Vec<(i64, GroupType)>> {
        self.ensure_open()?;
        let rows: Vec<(i64, Option<String>, i64)> = sqlx::query_as(
            "SELECT group_id, MIN(group_type), COUNT(*) FROM test_queue \
             WHERE group_id IS NOT NULL GROUP BY group_id ORDER BY group_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::storage("group stats", e))?;
        rows.into_iter()
            .map(|(group_id, kind, members)| {
                let group_type = match kind.as_deref() {
                    Some(raw) => parse_group_type(raw)?,
                    None => GroupType::for_size(usize::try_from(members).unwrap_or(0)),
                };
                Ok((group_id, group_type))
            })
            .collect()
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        tracing::debug!("closed queue database");
        Ok(())
    }
}
