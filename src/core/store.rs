//! Document store: durable per-project, per-category key→document maps.
//!
//! A registry is addressed by [`RegistryName`] (`project/category`). Documents
//! are JSON bodies keyed by an id unique within their registry. The store holds
//! no resolution logic; it only persists and returns snapshots.

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::StarlogError;
use crate::core::pool::RegistryPool;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, params};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const RULES: &str = "rules";
pub const DIARY: &str = "debug_diary";
pub const SESSIONS: &str = "starlog";

/// Registries every project owns from initialization on.
pub const PROJECT_CATEGORIES: [&str; 3] = [RULES, DIARY, SESSIONS];

/// Pseudo-project owning the registries shared by every project.
pub const GLOBAL_SCOPE: &str = "_global";
pub const FLIGHTS: &str = "flight_configs";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistryName {
    pub project: String,
    pub category: String,
}

impl RegistryName {
    pub fn new(project: &str, category: &str) -> Result<Self, StarlogError> {
        validate_project_name(project)?;
        if category.is_empty()
            || !category
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(StarlogError::InvalidArgument(format!(
                "invalid category '{}': expected [a-z0-9_]+",
                category
            )));
        }
        Ok(Self {
            project: project.to_string(),
            category: category.to_string(),
        })
    }

    /// Storage key, `project/category`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.project, self.category)
    }
}

impl fmt::Display for RegistryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.project, self.category)
    }
}

pub fn validate_project_name(project: &str) -> Result<(), StarlogError> {
    if project.is_empty()
        || !project
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(StarlogError::InvalidArgument(format!(
            "invalid project name '{}': expected [A-Za-z0-9_-]+",
            project
        )));
    }
    Ok(())
}

/// Stands for a whole registry in reference chains; never a document id.
pub const WHOLE_REGISTRY: &str = "*";

fn validate_document_id(id: &str) -> Result<(), StarlogError> {
    if id.is_empty()
        || id == WHOLE_REGISTRY
        || id.contains('/')
        || id.chars().any(char::is_whitespace)
    {
        return Err(StarlogError::InvalidArgument(format!(
            "invalid document id '{}'",
            id
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub body: JsonValue,
    pub created_at: String,
    pub updated_at: String,
}

impl Document {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, StarlogError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryInfo {
    pub name: String,
    pub category: String,
    pub documents: usize,
    pub created_at: String,
}

/// Handle to the registry database. Construct one per process and pass it
/// to every component that needs storage.
pub struct DocumentStore {
    root: PathBuf,
    pool: RegistryPool,
    broker: DbBroker,
}

impl DocumentStore {
    pub fn open(root: &Path, actor: &str) -> Result<Self, StarlogError> {
        db::initialize_registry_db(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            pool: RegistryPool::new(&db::registry_db_path(root)),
            broker: DbBroker::new(root, actor),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    pub fn audit_log_path(&self) -> &Path {
        self.broker.audit_log_path()
    }

    /// Create the registry if it does not exist. Returns `true` when created.
    pub fn create_registry(&self, project: &str, category: &str) -> Result<bool, StarlogError> {
        let name = RegistryName::new(project, category)?;
        let key = name.key();
        self.broker
            .with_write(&self.pool, &key, "registry.create", |conn| {
                let changed = conn.execute(
                    "INSERT OR IGNORE INTO registries(name, project, category, created_at)
                     VALUES(?1, ?2, ?3, ?4)",
                    params![key, name.project, name.category, time::now_rfc3339()],
                )?;
                Ok(changed > 0)
            })
    }

    pub fn registry_exists(&self, project: &str, category: &str) -> Result<bool, StarlogError> {
        let key = RegistryName::new(project, category)?.key();
        self.pool.with_read(|conn| registry_exists(conn, &key))
    }

    pub fn list_registries(&self, project: &str) -> Result<Vec<RegistryInfo>, StarlogError> {
        validate_project_name(project)?;
        self.pool.with_read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name, r.category, r.created_at,
                        (SELECT COUNT(*) FROM documents d WHERE d.registry = r.name)
                 FROM registries r WHERE r.project = ?1 ORDER BY r.category",
            )?;
            let rows = stmt.query_map(params![project], |row| {
                let count: i64 = row.get(3)?;
                Ok(RegistryInfo {
                    name: row.get(0)?,
                    category: row.get(1)?,
                    created_at: row.get(2)?,
                    documents: count.max(0) as usize,
                })
            })?;
            let mut out = Vec::new();
            for r in rows {
                out.push(r?);
            }
            Ok(out)
        })
    }

    /// Upsert `body` at `id`.
    pub fn put(
        &self,
        project: &str,
        category: &str,
        id: &str,
        body: &JsonValue,
    ) -> Result<Document, StarlogError> {
        self.transact(project, category, "document.put", |tx| tx.put(id, body))
    }

    pub fn get(&self, project: &str, category: &str, id: &str) -> Result<Document, StarlogError> {
        let name = RegistryName::new(project, category)?;
        let key = name.key();
        self.pool.with_read(|conn| {
            ensure_registry(conn, &key)?;
            select_one(conn, &key, id)?
                .ok_or_else(|| StarlogError::NotFound(format!("{} in registry {}", id, name)))
        })
    }

    /// Consistent snapshot of a registry, id-ascending.
    pub fn get_all(
        &self,
        project: &str,
        category: &str,
    ) -> Result<BTreeMap<String, Document>, StarlogError> {
        let key = RegistryName::new(project, category)?.key();
        self.pool.with_read(|conn| {
            ensure_registry(conn, &key)?;
            select_all(conn, &key)
        })
    }

    pub fn delete(&self, project: &str, category: &str, id: &str) -> Result<(), StarlogError> {
        self.transact(project, category, "document.delete", |tx| tx.delete(id))
    }

    pub fn get_as<T: DeserializeOwned>(
        &self,
        project: &str,
        category: &str,
        id: &str,
    ) -> Result<T, StarlogError> {
        self.get(project, category, id)?.parse()
    }

    pub fn get_all_as<T: DeserializeOwned>(
        &self,
        project: &str,
        category: &str,
    ) -> Result<Vec<T>, StarlogError> {
        self.get_all(project, category)?
            .values()
            .map(Document::parse)
            .collect()
    }

    /// Run `f` as one atomic, serialized write against a single registry.
    /// Check-then-write sequences (e.g. "no open session, then insert") belong here.
    pub fn transact<F, R>(
        &self,
        project: &str,
        category: &str,
        op_name: &str,
        f: F,
    ) -> Result<R, StarlogError>
    where
        F: FnOnce(&RegistryTx<'_>) -> Result<R, StarlogError>,
    {
        let name = RegistryName::new(project, category)?;
        let key = name.key();
        self.broker.with_write(&self.pool, &key, op_name, |conn| {
            ensure_registry(conn, &key)?;
            let tx = RegistryTx {
                conn,
                key: key.clone(),
                name: name.clone(),
            };
            f(&tx)
        })
    }
}

/// Registry view inside a write transaction.
pub struct RegistryTx<'c> {
    conn: &'c Connection,
    key: String,
    name: RegistryName,
}

impl RegistryTx<'_> {
    pub fn name(&self) -> &RegistryName {
        &self.name
    }

    pub fn get(&self, id: &str) -> Result<Option<Document>, StarlogError> {
        select_one(self.conn, &self.key, id)
    }

    pub fn get_all(&self) -> Result<BTreeMap<String, Document>, StarlogError> {
        select_all(self.conn, &self.key)
    }

    pub fn get_as<T: DeserializeOwned>(&self, id: &str) -> Result<T, StarlogError> {
        self.get(id)?
            .ok_or_else(|| StarlogError::NotFound(format!("{} in registry {}", id, self.name)))?
            .parse()
    }

    pub fn get_all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>, StarlogError> {
        self.get_all()?.values().map(Document::parse).collect()
    }

    pub fn put(&self, id: &str, body: &JsonValue) -> Result<Document, StarlogError> {
        validate_document_id(id)?;
        let now = time::now_rfc3339();
        let text = serde_json::to_string(body)?;
        self.conn.execute(
            "INSERT INTO documents(registry, id, body, created_at, updated_at)
             VALUES(?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(registry, id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![self.key, id, text, now],
        )?;
        select_one(self.conn, &self.key, id)?
            .ok_or_else(|| StarlogError::NotFound(format!("{} in registry {}", id, self.name)))
    }

    pub fn put_as<T: Serialize>(&self, id: &str, value: &T) -> Result<Document, StarlogError> {
        self.put(id, &serde_json::to_value(value)?)
    }

    /// Create-only variant of [`put`](Self::put).
    pub fn insert(&self, id: &str, body: &JsonValue) -> Result<Document, StarlogError> {
        if self.get(id)?.is_some() {
            return Err(StarlogError::AlreadyExists(format!(
                "{} in registry {}",
                id, self.name
            )));
        }
        self.put(id, body)
    }

    pub fn delete(&self, id: &str) -> Result<(), StarlogError> {
        let changed = self.conn.execute(
            "DELETE FROM documents WHERE registry = ?1 AND id = ?2",
            params![self.key, id],
        )?;
        if changed == 0 {
            return Err(StarlogError::NotFound(format!(
                "{} in registry {}",
                id, self.name
            )));
        }
        Ok(())
    }

    pub fn clear(&self) -> Result<usize, StarlogError> {
        Ok(self
            .conn
            .execute("DELETE FROM documents WHERE registry = ?1", params![self.key])?)
    }
}

fn registry_exists(conn: &Connection, key: &str) -> Result<bool, StarlogError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM registries WHERE name = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn ensure_registry(conn: &Connection, key: &str) -> Result<(), StarlogError> {
    if registry_exists(conn, key)? {
        Ok(())
    } else {
        Err(StarlogError::NotFound(format!("registry {}", key)))
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_document(
    (id, body, created_at, updated_at): (String, String, String, String),
) -> Result<Document, StarlogError> {
    Ok(Document {
        id,
        body: serde_json::from_str(&body)?,
        created_at,
        updated_at,
    })
}

fn select_one(conn: &Connection, key: &str, id: &str) -> Result<Option<Document>, StarlogError> {
    let raw = conn
        .query_row(
            "SELECT id, body, created_at, updated_at FROM documents WHERE registry = ?1 AND id = ?2",
            params![key, id],
            row_to_document,
        )
        .optional()?;
    raw.map(build_document).transpose()
}

fn select_all(conn: &Connection, key: &str) -> Result<BTreeMap<String, Document>, StarlogError> {
    let mut stmt = conn.prepare(
        "SELECT id, body, created_at, updated_at FROM documents WHERE registry = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![key], row_to_document)?;
    let mut out = BTreeMap::new();
    for r in rows {
        let doc = build_document(r?)?;
        out.insert(doc.id.clone(), doc);
    }
    Ok(out)
}
