use crate::core::error::StarlogError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub fn db_connect(db_path: &Path, busy_timeout_secs: u64) -> Result<Connection, StarlogError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(busy_timeout_secs))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn registry_db_path(root: &Path) -> PathBuf {
    root.join(schemas::REGISTRY_DB_NAME)
}

/// Creates the data root and brings the registry schema up to date.
pub fn initialize_registry_db(root: &Path) -> Result<(), StarlogError> {
    fs::create_dir_all(root)?;
    let conn = db_connect(&registry_db_path(root), 5)?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_META, [])?;

    let current: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;
    let current_version: u32 = current
        .as_deref()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(0);

    if current_version >= schemas::REGISTRY_SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute(schemas::REGISTRY_DB_SCHEMA_REGISTRIES, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_DOCUMENTS, [])?;
    conn.execute(schemas::REGISTRY_DB_SCHEMA_INDEX_PROJECT, [])?;
    conn.execute(
        "INSERT OR REPLACE INTO meta(key, value) VALUES('schema_version', ?1)",
        [schemas::REGISTRY_SCHEMA_VERSION.to_string()],
    )?;
    tracing::debug!(db = %registry_db_path(root).display(), "registry schema initialized");
    Ok(())
}
