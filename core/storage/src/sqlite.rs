//! SQLite-backed metadata repository.
//!
//! Persists object records in a single table. The connection is shared behind
//! a mutex and every query runs on the blocking thread pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::metadata::MetadataRepository;
use crate::record::{AccessLevel, StoredObject};
use docvault_common::{Error, Locator, ObjectId, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stored_objects (
    id TEXT PRIMARY KEY,
    owner_id TEXT,
    original_name TEXT NOT NULL,
    storage_locator TEXT NOT NULL UNIQUE,
    size INTEGER NOT NULL,
    mime_type TEXT NOT NULL,
    wrapped_data_key BLOB NOT NULL,
    access_level TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER,
    active INTEGER NOT NULL DEFAULT 1,
    associated_analysis_id TEXT,
    CHECK (expires_at IS NULL OR expires_at > created_at)
);

CREATE INDEX IF NOT EXISTS idx_stored_objects_expiry
    ON stored_objects(active, expires_at);
"#;

const SELECT_COLUMNS: &str = r#"
SELECT id, owner_id, original_name, storage_locator, size, mime_type,
       wrapped_data_key, access_level, created_at, expires_at, active,
       associated_analysis_id
FROM stored_objects
"#;

/// Metadata repository using SQLite.
#[derive(Clone)]
pub struct SqliteMetadataRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataRepository {
    /// Create or open a repository database.
    ///
    /// # Errors
    /// - Database creation or schema initialization failure
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(map_sqlite_error)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_error)?;

        info!("Metadata repository opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory repository (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Storage("metadata connection poisoned".to_string()))?;
            f(&guard).map_err(map_sqlite_error)
        })
        .await
        .map_err(|e| Error::Storage(format!("metadata task failed: {}", e)))?
    }
}

#[async_trait]
impl MetadataRepository for SqliteMetadataRepository {
    async fn create(&self, record: &StoredObject) -> Result<()> {
        record.validate()?;
        let record = record.clone();

        debug!(object_id = %record.id, "Inserting metadata record");
        self.with_conn(move |conn| {
            conn.execute(
                r#"
                INSERT INTO stored_objects
                (id, owner_id, original_name, storage_locator, size, mime_type,
                 wrapped_data_key, access_level, created_at, expires_at, active,
                 associated_analysis_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    record.id.to_string(),
                    record.owner_id,
                    record.original_name,
                    record.storage_locator.as_str(),
                    record.size as i64,
                    record.mime_type,
                    record.wrapped_data_key,
                    record.access_level.as_str(),
                    record.created_at.timestamp_millis(),
                    record.expires_at.map(|t| t.timestamp_millis()),
                    record.active as i32,
                    record.associated_analysis_id,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &ObjectId) -> Result<Option<StoredObject>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{} WHERE id = ?1 AND active = 1", SELECT_COLUMNS),
                [id],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    async fn mark_inactive(&self, id: &ObjectId) -> Result<bool> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE stored_objects SET active = 0 WHERE id = ?1 AND active = 1",
                [id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<StoredObject>> {
        let now = now.timestamp_millis();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE active = 1 AND expires_at IS NOT NULL AND expires_at < ?1 \
                 ORDER BY expires_at",
                SELECT_COLUMNS
            ))?;
            let rows = stmt.query_map([now], row_to_record)?;
            rows.collect()
        })
        .await
    }

    async fn active_locators(&self) -> Result<Vec<Locator>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT storage_locator FROM stored_objects WHERE active = 1")?;
            let rows = stmt.query_map([], |row| {
                let raw: String = row.get(0)?;
                Locator::parse(&raw).map_err(|e| conversion_error(0, e))
            })?;
            rows.collect()
        })
        .await
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<StoredObject> {
    let id: String = row.get(0)?;
    let locator: String = row.get(3)?;
    let size: i64 = row.get(4)?;
    let access_level: String = row.get(7)?;
    let created_at: i64 = row.get(8)?;
    let expires_at: Option<i64> = row.get(9)?;

    Ok(StoredObject {
        id: ObjectId::parse(&id).map_err(|e| conversion_error(0, e))?,
        owner_id: row.get(1)?,
        original_name: row.get(2)?,
        storage_locator: Locator::parse(&locator).map_err(|e| conversion_error(3, e))?,
        size: u64::try_from(size).map_err(|e| conversion_error(4, e))?,
        mime_type: row.get(5)?,
        wrapped_data_key: row.get(6)?,
        access_level: access_level
            .parse::<AccessLevel>()
            .map_err(|e| conversion_error(7, e))?,
        created_at: millis_to_datetime(8, created_at)?,
        expires_at: expires_at
            .map(|millis| millis_to_datetime(9, millis))
            .transpose()?,
        active: row.get::<_, i32>(10)? != 0,
        associated_analysis_id: row.get(11)?,
    })
}

fn millis_to_datetime(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        conversion_error(
            column,
            Error::Serialization("timestamp out of range".to_string()),
        )
    })
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

fn map_sqlite_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.extended_code {
            rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE => {
                return Error::AlreadyExists("metadata record".to_string());
            }
            rusqlite::ffi::SQLITE_CONSTRAINT_CHECK
            | rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL => {
                return Error::InvalidInput(format!("metadata record rejected: {}", err));
            }
            _ => {}
        }
    }

    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => {
            Error::Storage(format!("metadata constraint: {}", err))
        }
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            Error::Transient("metadata database busy".to_string())
        }
        _ => Error::Storage(format!("metadata database: {}", err)),
    }
}
