//! Database schema definitions for the STARLOG registry bin.
//!
//! All registries of all projects share one SQLite database (`registry.db`)
//! under the data root. A registry is a `(project, category)` pair; its
//! documents are JSON bodies keyed by id.

pub const REGISTRY_DB_NAME: &str = "registry.db";
pub const BROKER_EVENTS_NAME: &str = "broker.events.jsonl";
pub const ISSUE_EVENTS_NAME: &str = "issues.jsonl";
pub const REGISTRY_SCHEMA_VERSION: u32 = 1;

pub const REGISTRY_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const REGISTRY_DB_SCHEMA_REGISTRIES: &str = "
    CREATE TABLE IF NOT EXISTS registries (
        name TEXT PRIMARY KEY,
        project TEXT NOT NULL,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE(project, category)
    )
";

pub const REGISTRY_DB_SCHEMA_DOCUMENTS: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        registry TEXT NOT NULL,
        id TEXT NOT NULL,
        body TEXT NOT NULL, -- JSON document
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY(registry, id),
        FOREIGN KEY(registry) REFERENCES registries(name) ON DELETE CASCADE
    )
";

pub const REGISTRY_DB_SCHEMA_INDEX_PROJECT: &str =
    "CREATE INDEX IF NOT EXISTS idx_registries_project ON registries(project)";
