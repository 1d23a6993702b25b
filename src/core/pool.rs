//! SQLite connection handling with per-registry write serialization.
//!
//! - Each registry (`project/category`) owns a **write mutex**; at most one
//!   writer per registry at a time, writers of different registries only meet
//!   at SQLite's own lock (absorbed by `busy_timeout`).
//! - Every write runs inside `BEGIN IMMEDIATE ... COMMIT`, so readers never
//!   observe a half-applied mutation.
//! - Read connections are opened fresh per operation without any mutex
//!   (WAL allows concurrent readers across threads and processes).
//!
//! Connections are not cached between calls.

use crate::core::db;
use crate::core::error::StarlogError;
use rusqlite::Connection;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Maximum retry attempts for busy/locked errors when opening a write transaction.
const MAX_RETRIES: u32 = 5;
/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 50;
/// Maximum delay cap (milliseconds).
const MAX_DELAY_MS: u64 = 2_000;

const WRITE_BUSY_TIMEOUT_SECS: u64 = 5;
const READ_BUSY_TIMEOUT_SECS: u64 = 5;

pub struct RegistryPool {
    db_path: PathBuf,
    write_locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

impl RegistryPool {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
            write_locks: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn write_lock_for(&self, registry: &str) -> Result<Arc<Mutex<()>>, StarlogError> {
        let mut locks = self.write_locks.lock().map_err(|_| {
            StarlogError::ExternalDependencyFailure("registry lock table poisoned".to_string())
        })?;
        Ok(locks
            .entry(registry.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }

    /// Run `f` as one transaction while holding the registry's write lock.
    /// The transaction is rolled back when `f` fails.
    pub fn with_write<F, R>(&self, registry: &str, f: F) -> Result<R, StarlogError>
    where
        F: FnOnce(&Connection) -> Result<R, StarlogError>,
    {
        let lock = self.write_lock_for(registry)?;
        let _guard = lock.lock().map_err(|_| {
            StarlogError::ExternalDependencyFailure(format!("write lock for {registry} poisoned"))
        })?;

        let conn = db::db_connect(&self.db_path, WRITE_BUSY_TIMEOUT_SECS)?;
        retry_on_busy(|| {
            conn.execute_batch("BEGIN IMMEDIATE")
                .map_err(StarlogError::from)
        })?;

        match f(&conn) {
            Ok(value) => {
                conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    tracing::warn!(%registry, error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Run `f` with a fresh read connection (no mutex serialization).
    pub fn with_read<F, R>(&self, f: F) -> Result<R, StarlogError>
    where
        F: FnOnce(&Connection) -> Result<R, StarlogError>,
    {
        let conn = db::db_connect(&self.db_path, READ_BUSY_TIMEOUT_SECS)?;
        f(&conn)
    }
}

/// Retry a closure on `SQLITE_BUSY` / `DatabaseLocked` with exponential backoff.
fn retry_on_busy<F, R>(mut f: F) -> Result<R, StarlogError>
where
    F: FnMut() -> Result<R, StarlogError>,
{
    let mut attempt = 0u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if is_busy_error(&e) && attempt < MAX_RETRIES => {
                attempt += 1;
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(MAX_DELAY_MS);
                tracing::debug!(attempt, delay_ms, "registry db busy, retrying");
                thread::sleep(Duration::from_millis(delay_ms));
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_busy_error(err: &StarlogError) -> bool {
    match err {
        StarlogError::RusqliteError(rusqlite::Error::SqliteFailure(code, _)) => matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}
