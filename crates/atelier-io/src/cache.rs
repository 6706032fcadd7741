//! Durable local blob cache backed by a single SQLite file.
//!
//! Stores image bytes under caller-generated random keys. Lookups of
//! missing keys are `Ok(None)`, never errors, and deleting a missing key
//! succeeds. SQLite work runs on the blocking thread pool.
//!
//! Writes go through one shared connection and are serialized. Reads of an
//! on-disk store each open their own read-only connection, so they run
//! concurrently with each other and, in WAL mode, with a write. An
//! in-memory store has only the shared connection.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tokio::task::JoinError;

/// Schema version written to `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// How long a reader waits on a locked database before failing.
const READ_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the blob cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The store could not be opened; callers should fall back to URLs.
    #[error("blob cache unavailable: {reason}")]
    Unavailable {
        /// Why opening failed.
        reason: String,
    },

    /// A read or write failed after the store was opened.
    #[error("blob cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// The blocking task running the query panicked or was cancelled.
    #[error("blob cache task failed: {0}")]
    Background(#[from] JoinError),
}

/// A cache key: an opaque, unguessable token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// A fresh random key (UUID v4).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// The key text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to the blob store. Cheap to clone; clones share one write
/// connection.
#[derive(Clone)]
pub struct BlobCache {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl fmt::Debug for BlobCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobCache").field("path", &self.path).finish_non_exhaustive()
    }
}

impl BlobCache {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the file or its directory
    /// cannot be created, the schema cannot be set up, or the file was
    /// written by a newer schema version.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let opened = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_file(&opened)).await??;
        tracing::debug!(path = %path.display(), "blob cache opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// A private, non-persistent store (tests and dry runs).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// File backing this store, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Store `bytes` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the write fails.
    pub async fn put(&self, key: &CacheKey, bytes: Vec<u8>) -> Result<(), CacheError> {
        let len = bytes.len();
        let k = key.as_str().to_owned();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO blobs (key, data) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET data = excluded.data",
                params![k, bytes],
            )
            .map(|_| ())
        })
        .await?;
        tracing::debug!(%key, bytes = len, "cached blob");
        Ok(())
    }

    /// Generate a key, store `bytes` under it, and return the key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the write fails.
    pub async fn store(&self, bytes: Vec<u8>) -> Result<CacheKey, CacheError> {
        let key = CacheKey::generate();
        self.put(&key, bytes).await?;
        Ok(key)
    }

    /// Bytes stored under `key`, or `None` if there are none.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the read fails.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let k = key.as_str().to_owned();
        self.with_reader(move |conn| {
            conn.query_row("SELECT data FROM blobs WHERE key = ?1", params![k], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
        })
        .await
    }

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the delete fails.
    pub async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let k = key.as_str().to_owned();
        let removed = self
            .with_conn(move |conn| conn.execute("DELETE FROM blobs WHERE key = ?1", params![k]))
            .await?;
        tracing::debug!(%key, removed, "deleted blob");
        Ok(())
    }

    /// Every stored key with its payload size, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Storage`] if the query fails.
    pub async fn keys(&self) -> Result<Vec<(CacheKey, usize)>, CacheError> {
        self.with_reader(|conn| {
            let mut stmt = conn.prepare("SELECT key, length(data) FROM blobs ORDER BY key")?;
            let rows = stmt.query_map([], |row| {
                let key: String = row.get(0)?;
                let len: i64 = row.get(1)?;
                Ok((CacheKey(key), usize::try_from(len).unwrap_or(0)))
            })?;
            let keys = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(keys)
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await?;
        Ok(result?)
    }

    async fn with_reader<T, F>(&self, f: F) -> Result<T, CacheError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let Some(path) = self.path.clone() else {
            return self.with_conn(f).await;
        };
        let result = tokio::task::spawn_blocking(move || {
            let conn = Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(READ_BUSY_TIMEOUT)?;
            f(&conn)
        })
        .await?;
        Ok(result?)
    }
}

fn open_file(path: &Path) -> Result<Connection, CacheError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| CacheError::Unavailable {
            reason: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    let conn = Connection::open(path).map_err(unavailable)?;
    init_schema(&conn)?;
    let mode = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0));
    match mode {
        Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
        Ok(mode) => tracing::debug!(%mode, "blob cache not in WAL mode, writes block readers"),
        Err(err) => tracing::debug!(%err, "could not switch blob cache to WAL"),
    }
    Ok(conn)
}

fn init_schema(conn: &Connection) -> Result<(), CacheError> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(unavailable)?;
    if version > SCHEMA_VERSION {
        return Err(CacheError::Unavailable {
            reason: format!("schema version {version} is newer than supported {SCHEMA_VERSION}"),
        });
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS blobs (
            key  TEXT PRIMARY KEY,
            data BLOB NOT NULL
        );
        PRAGMA user_version = {SCHEMA_VERSION};"
    ))
    .map_err(unavailable)?;
    Ok(())
}

fn unavailable(err: rusqlite::Error) -> CacheError {
    CacheError::Unavailable {
        reason: err.to_string(),
    }
}
