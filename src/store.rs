//! SQLite-backed persistence for amplitude summaries.
//!
//! One `wavecache.db` file per cache root, one table keyed by the track's
//! cache-key text. A store that fails to open degrades to a disabled store
//! instead of failing the caller: every `get` misses and every `put` is a
//! no-op for the rest of the process lifetime.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

use crate::summary::Summary;
use crate::track::TrackKey;

const DB_FILE_NAME: &str = "wavecache.db";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS wave (
    path TEXT PRIMARY KEY NOT NULL,
    channels INTEGER NOT NULL,
    compression INTEGER NOT NULL DEFAULT 0,
    data BLOB NOT NULL
)";

/// Reserved compression tag written with every record.
const COMPRESSION_NONE: i64 = 0;

/// Errors raised while opening the cache database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to create the cache directory.
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to open or initialize the database file.
    #[error("Failed to open summary cache {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

/// Result of copying a stored record into a caller-provided buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoredRead {
    /// Number of floats actually copied (possibly truncated to fit).
    pub values_copied: usize,
    /// Channel count recorded with the blob.
    pub channels: u16,
}

/// Cache admission policy: which tracks are worth persisting at all.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CachePolicy {
    /// Tracks longer than this are never looked up or stored.
    pub max_cached_duration_seconds: f64,
}

impl CachePolicy {
    /// Whether a track with the given duration may touch the store.
    ///
    /// An unknown duration (reported as 0.0) cannot be checked against the
    /// limit, so such tracks are never cached.
    pub fn allows(&self, key: &TrackKey, duration_seconds: f64) -> bool {
        key.is_local()
            && duration_seconds > 0.0
            && duration_seconds <= self.max_cached_duration_seconds
    }
}

/// Embedded key/value store mapping track keys to serialized summaries.
pub struct SummaryStore {
    conn: Option<Mutex<Connection>>,
}

impl SummaryStore {
    /// Open (or create) the cache database under `base_dir`.
    ///
    /// Never fails: open errors disable the store for the process lifetime
    /// and are logged once. A corrupt database file is deleted and the schema
    /// recreated before giving up.
    pub fn open(base_dir: &Path) -> Self {
        match Self::try_open(base_dir) {
            Ok(conn) => Self {
                conn: Some(Mutex::new(conn)),
            },
            Err(err) => {
                tracing::warn!("Summary cache disabled: {err}");
                Self { conn: None }
            }
        }
    }

    /// A store that never persists anything; `get` always misses.
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    /// Whether the backing database is usable.
    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    fn try_open(base_dir: &Path) -> Result<Connection, StoreError> {
        std::fs::create_dir_all(base_dir).map_err(|source| StoreError::CreateDir {
            path: base_dir.to_path_buf(),
            source,
        })?;
        let db_path = base_dir.join(DB_FILE_NAME);
        match Self::open_and_init(&db_path) {
            Ok(conn) => Ok(conn),
            Err(first) => {
                // A corrupt file is recoverable: drop it and recreate the
                // schema from scratch. The summaries are only a cache.
                tracing::warn!(
                    "Recreating summary cache at {}: {first}",
                    db_path.display()
                );
                let _ = std::fs::remove_file(&db_path);
                Self::open_and_init(&db_path).map_err(|source| StoreError::Open {
                    path: db_path,
                    source,
                })
            }
        }
    }

    fn open_and_init(db_path: &Path) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute(SCHEMA, [])?;
        Ok(conn)
    }

    /// Load the summary stored for `key`, if any.
    ///
    /// A record whose blob does not divide into whole bucket triples is
    /// truncated to the largest valid prefix; the read never runs past the
    /// stored length. SQL errors degrade to a miss.
    pub fn get(&self, key: &TrackKey) -> Option<Summary> {
        let (channels, blob) = self.fetch_record(key)?;
        Some(Summary::from_blob(channels, &blob))
    }

    /// Copy the stored record for `key` into `out` as flat floats.
    ///
    /// Copies at most `out.len()` values regardless of the stored blob size
    /// and reports the truncated count.
    pub fn get_into(&self, key: &TrackKey, out: &mut [f32]) -> Option<StoredRead> {
        let (channels, blob) = self.fetch_record(key)?;
        let summary = Summary::from_blob(channels, &blob);
        let values_copied = summary.write_values(out);
        Some(StoredRead {
            values_copied,
            channels,
        })
    }

    fn fetch_record(&self, key: &TrackKey) -> Option<(u16, Vec<u8>)> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT channels, data FROM wave WHERE path = ?1",
                params![key.cache_key()],
                |row| {
                    let channels: i64 = row.get(0)?;
                    let data: Vec<u8> = row.get(1)?;
                    Ok((channels, data))
                },
            )
            .optional();
        match row {
            Ok(Some((channels, data))) => {
                let channels = u16::try_from(channels.max(0)).unwrap_or(u16::MAX);
                Some((channels, data))
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("Summary cache read failed for {key}: {err}");
                None
            }
        }
    }

    /// Persist `summary` for `key`, overwriting any previous record.
    ///
    /// Last write wins; a stale duplicate cannot corrupt the store because
    /// the whole record is replaced atomically.
    pub fn put(&self, key: &TrackKey, summary: &Summary) {
        let Some(conn) = self.lock() else { return };
        let blob = summary.to_blob();
        let result = conn.execute(
            "INSERT INTO wave (path, channels, compression, data)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(path) DO UPDATE SET
               channels = excluded.channels,
               compression = excluded.compression,
               data = excluded.data",
            params![
                key.cache_key(),
                i64::from(summary.channels()),
                COMPRESSION_NONE,
                blob
            ],
        );
        if let Err(err) = result {
            tracing::warn!("Summary cache write failed for {key}: {err}");
        }
    }

    /// Remove the record for `key`. Returns whether a record was deleted.
    pub fn delete(&self, key: &TrackKey) -> bool {
        let Some(conn) = self.lock() else {
            return false;
        };
        match conn.execute("DELETE FROM wave WHERE path = ?1", params![key.cache_key()]) {
            Ok(rows) => rows > 0,
            Err(err) => {
                tracing::warn!("Summary cache delete failed for {key}: {err}");
                false
            }
        }
    }

    /// Whether a record exists for `key`.
    pub fn exists(&self, key: &TrackKey) -> bool {
        let Some(conn) = self.lock() else {
            return false;
        };
        conn.query_row(
            "SELECT 1 FROM wave WHERE path = ?1",
            params![key.cache_key()],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .unwrap_or_else(|err| {
            tracing::warn!("Summary cache lookup failed for {key}: {err}");
            false
        })
    }

    fn lock(&self) -> Option<std::sync::MutexGuard<'_, Connection>> {
        let mutex = self.conn.as_ref()?;
        Some(mutex.lock().unwrap_or_else(|err| err.into_inner()))
    }

    #[cfg(test)]
    fn put_raw_blob(&self, key: &TrackKey, channels: u16, blob: &[u8]) {
        let conn = self.lock().expect("store enabled");
        conn.execute(
            "INSERT INTO wave (path, channels, compression, data)
             VALUES (?1, ?2, 0, ?3)
             ON CONFLICT(path) DO UPDATE SET channels = excluded.channels,
               data = excluded.data",
            params![key.cache_key(), i64::from(channels), blob],
        )
        .expect("raw insert");
    }
}
