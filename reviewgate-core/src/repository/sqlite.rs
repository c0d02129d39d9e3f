//! SQLite implementation of `ItemRepository`.
//!
//! Each work item is stored as a JSON document, with the columns needed for
//! filtering (`status`, `content_type`, `version`, `created_at`) kept
//! alongside it.
//!
//! # Schema Versioning
//!
//! The `schema_version` table tracks the schema version. When the schema
//! needs to change, increment `CURRENT_SCHEMA_VERSION` and add a step to
//! `run_migrations()`. Steps run in order from the stored version.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::ItemRepository;
use crate::error::RepositoryError;
use crate::item::{ItemId, ReviewStatus, WorkItem};

/// Current schema version. Increment when making schema changes and add the
/// corresponding step in `run_migrations()`.
pub(crate) const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed item repository.
///
/// Synchronous rusqlite calls run on `tokio::task::spawn_blocking`.
pub struct SqliteRepository {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

fn lock_conn<'a>(
    conn: &'a Mutex<Connection>,
    operation: &'static str,
) -> Result<MutexGuard<'a, Connection>, RepositoryError> {
    conn.lock()
        .map_err(|_| RepositoryError::storage(operation, "connection mutex poisoned"))
}

/// Convert a version to i64 for storage without silent wraparound.
fn version_to_i64(version: u64, operation: &'static str) -> Result<i64, RepositoryError> {
    i64::try_from(version).map_err(|_| {
        RepositoryError::storage(
            operation,
            format!("version {} exceeds maximum storable value ({})", version, i64::MAX),
        )
    })
}

impl SqliteRepository {
    /// Open (or create) the database file at `path`, creating its directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                RepositoryError::storage(
                    "create database directory",
                    format!("{}: {}", parent.display(), e),
                )
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;
        Self::from_connection(conn, "wal")
    }

    /// Create a new in-memory SQLite repository (for testing).
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;
        // In-memory databases report "memory" as their journal mode.
        Self::from_connection(conn, "memory")
    }

    /// Apply the durability pragmas and bring the schema up to date.
    ///
    /// - `journal_mode = WAL`
    /// - `synchronous = FULL`
    /// - `busy_timeout = 5000ms`
    fn from_connection(conn: Connection, expected_journal: &str) -> Result<Self, RepositoryError> {
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        if !journal_mode.eq_ignore_ascii_case(expected_journal) {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!(
                    "SQLite returned '{}' instead of '{}'",
                    journal_mode, expected_journal
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure database", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {} is newer than supported version {}; \
                     upgrade the application",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS work_items (
                    id TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    content_type TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    item_json TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_work_items_status
                    ON work_items(status, created_at);
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        debug!(
            "Migrated work item schema from v{} to v{}",
            from_version, CURRENT_SCHEMA_VERSION
        );
        Ok(())
    }
}

/// Column values derived from a work item for a write.
struct Row {
    id: String,
    status: &'static str,
    content_type: &'static str,
    version: i64,
    json: String,
    created_at: i64,
    updated_at: i64,
}

impl Row {
    fn from_item(item: &WorkItem, operation: &'static str) -> Result<Self, RepositoryError> {
        let json = serde_json::to_string(item)
            .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;
        Ok(Self {
            id: item.id.0.clone(),
            status: item.status.as_str(),
            content_type: item.content_type.as_str(),
            version: version_to_i64(item.version, operation)?,
            json,
            created_at: item.created_at.timestamp_millis(),
            updated_at: item.updated_at.timestamp_millis(),
        })
    }
}

fn decode_item(json: &str) -> Result<WorkItem, RepositoryError> {
    serde_json::from_str(json).map_err(|_| RepositoryError::corruption("work item JSON"))
}

#[async_trait]
impl ItemRepository for SqliteRepository {
    async fn get(&self, id: &ItemId) -> Result<Option<WorkItem>, RepositoryError> {
        let conn = self.conn.clone();
        let id = id.0.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "get")?;
            let json: Option<String> = conn
                .query_row(
                    "SELECT item_json FROM work_items WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| RepositoryError::storage("get", e.to_string()))?;
            json.as_deref().map(decode_item).transpose()
        })
        .await
        .map_err(|e| RepositoryError::storage("get", e.to_string()))?
    }

    async fn put(&self, item: WorkItem) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let row = Row::from_item(&item, "put")?;

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "put")?;
            conn.execute(
                "INSERT INTO work_items
                     (id, status, content_type, version, item_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     status = excluded.status,
                     content_type = excluded.content_type,
                     version = excluded.version,
                     item_json = excluded.item_json,
                     updated_at = excluded.updated_at",
                params![
                    row.id,
                    row.status,
                    row.content_type,
                    row.version,
                    row.json,
                    row.created_at,
                    row.updated_at
                ],
            )
            .map_err(|e| RepositoryError::storage("put", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("put", e.to_string()))?
    }

    async fn insert_new(&self, item: WorkItem) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let row = Row::from_item(&item, "insert_new")?;
        let item_id = item.id;

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "insert_new")?;
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO work_items
                         (id, status, content_type, version, item_json, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        row.id,
                        row.status,
                        row.content_type,
                        row.version,
                        row.json,
                        row.created_at,
                        row.updated_at
                    ],
                )
                .map_err(|e| RepositoryError::storage("insert_new", e.to_string()))?;
            if inserted == 0 {
                return Err(RepositoryError::AlreadyExists(item_id));
            }
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("insert_new", e.to_string()))?
    }

    async fn list(&self, status: Option<ReviewStatus>) -> Result<Vec<WorkItem>, RepositoryError> {
        let conn = self.conn.clone();
        let status = status.map(ReviewStatus::as_str);

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "list")?;
            let mut stmt = conn
                .prepare(
                    "SELECT item_json FROM work_items
                     WHERE ?1 IS NULL OR status = ?1
                     ORDER BY created_at ASC, id ASC",
                )
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let rows = stmt
                .query_map(params![status], |row| row.get::<_, String>(0))
                .map_err(|e| RepositoryError::storage("list", e.to_string()))?;

            let mut items = Vec::new();
            for row in rows {
                let json = row.map_err(|e| RepositoryError::storage("list row", e.to_string()))?;
                items.push(decode_item(&json)?);
            }
            Ok(items)
        })
        .await
        .map_err(|e| RepositoryError::storage("list", e.to_string()))?
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = lock_conn(&conn, "count")?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM work_items", [], |row| row.get(0))
                .map_err(|e| RepositoryError::storage("count", e.to_string()))?;
            usize::try_from(count)
                .map_err(|_| RepositoryError::storage("count", format!("invalid count {}", count)))
        })
        .await
        .map_err(|e| RepositoryError::storage("count", e.to_string()))?
    }
}
