//! Read-only access to the local notification store.
//!
//! The store is queried as "records for one application, delivered after a
//! watermark, newest first, at most N rows". Timestamps are in store time
//! (seconds since 2001-01-01 UTC, see [`crate::ingest::STORE_EPOCH_OFFSET_SECS`]).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, Row};
use thiserror::Error;
use tracing::debug;

/// Upper bound for a single store query
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const RECENT_RECORDS_SQL: &str = "
    SELECT record.uuid, record.data, record.delivered_date
    FROM record
    INNER JOIN app ON app.app_id = record.app_id
    WHERE app.identifier = ?1
      AND record.delivered_date > ?2
    ORDER BY record.delivered_date DESC
    LIMIT ?3";

/// Errors that can occur when querying the store
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store cannot be opened (missing or no permission). Retrying will
    /// not help until access is granted out of band.
    #[error("Notification store is not accessible: {0}")]
    AccessDenied(String),

    #[error("Store query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store query failed: {0}")]
    Query(String),
}

impl StoreError {
    /// Fatal errors disable the detector; everything else is retried next tick
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::AccessDenied(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    ErrorCode::CannotOpen
                        | ErrorCode::PermissionDenied
                        | ErrorCode::AuthorizationForStatementDenied
                ) =>
            {
                StoreError::AccessDenied(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// One row from the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    /// Opaque record identifier (a UUID blob in practice)
    pub identifier: Vec<u8>,

    /// Property-list payload
    pub payload: Vec<u8>,

    /// Delivery time in store time
    pub delivered_at: f64,
}

impl StoreRecord {
    pub fn identifier_hex(&self) -> String {
        hex::encode(&self.identifier)
    }
}

/// Parameters for a recent-records query
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub app_identifier: String,
    /// Exclusive lower bound on delivery time (store time)
    pub delivered_after: f64,
    pub limit: usize,
}

/// A read-only notification store
pub trait NotificationStore: Send + Sync {
    /// Human-readable store location for logs
    fn describe(&self) -> String;

    /// Records matching the query, newest first
    fn recent_records(&self, query: &RecordQuery) -> Result<Vec<StoreRecord>, StoreError>;
}

/// Run a blocking store query off the async runtime with a timeout
pub async fn query_with_timeout(
    store: Arc<dyn NotificationStore>,
    query: RecordQuery,
    timeout: Duration,
) -> Result<Vec<StoreRecord>, StoreError> {
    let task = tokio::task::spawn_blocking(move || store.recent_records(&query));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(StoreError::Query(format!("query task failed: {}", join_err))),
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// SQLite-backed store, opened read-only per query
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

impl NotificationStore for SqliteStore {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn recent_records(&self, query: &RecordQuery) -> Result<Vec<StoreRecord>, StoreError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(RECENT_RECORDS_SQL)?;

        let rows = stmt.query_map(
            params![query.app_identifier, query.delivered_after, query.limit as i64],
            read_record,
        )?;

        let mut records = Vec::new();
        for row in rows {
            match row {
                Ok(record) => records.push(record),
                // A single malformed row is skipped
                Err(e) => debug!("Skipping unreadable record: {}", e),
            }
        }

        Ok(records)
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<StoreRecord> {
    Ok(StoreRecord {
        identifier: bytes_column(row, 0)?,
        payload: bytes_column(row, 1)?,
        delivered_at: row.get(2)?,
    })
}

/// Accept BLOB or TEXT columns as raw bytes
fn bytes_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<u8>> {
    match row.get_ref(idx)? {
        ValueRef::Blob(b) => Ok(b.to_vec()),
        ValueRef::Text(t) => Ok(t.to_vec()),
        ValueRef::Null => Ok(Vec::new()),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "bytes".to_string(),
            other.data_type(),
        )),
    }
}

/// In-memory store for wiring without a platform database
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<(String, StoreRecord)>>,
    failure: Mutex<Option<StoreError>>,
    queries: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record for an application
    pub fn push(&self, app_identifier: &str, record: StoreRecord) {
        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        records.push((app_identifier.to_string(), record));
    }

    /// Make every following query fail with `error` (or succeed again with `None`)
    pub fn set_failure(&self, error: Option<StoreError>) {
        *self.failure.lock().unwrap_or_else(|p| p.into_inner()) = error;
    }

    /// Number of queries served so far
    pub fn query_count(&self) -> usize {
        *self.queries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl NotificationStore for MemoryStore {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn recent_records(&self, query: &RecordQuery) -> Result<Vec<StoreRecord>, StoreError> {
        *self.queries.lock().unwrap_or_else(|p| p.into_inner()) += 1;

        if let Some(err) = self.failure.lock().unwrap_or_else(|p| p.into_inner()).clone() {
            return Err(err);
        }

        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        let mut matching: Vec<StoreRecord> = records
            .iter()
            .filter(|(app, r)| *app == query.app_identifier && r.delivered_at > query.delivered_after)
            .map(|(_, r)| r.clone())
            .collect();

        matching.sort_by(|a, b| b.delivered_at.total_cmp(&a.delivered_at));
        matching.truncate(query.limit);
        Ok(matching)
    }
}
