use crate::core::error::StarlogError;
use crate::core::pool::RegistryPool;
use crate::core::schemas;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The DB Broker is the "thin waist" for registry mutations.
/// Every write goes through it and leaves one audit line in `broker.events.jsonl`.
pub struct DbBroker {
    audit_log_path: PathBuf,
    actor: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    pub op: String,
    pub registry: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path, actor: &str) -> Self {
        Self {
            audit_log_path: root.join(schemas::BROKER_EVENTS_NAME),
            actor: actor.to_string(),
        }
    }

    pub fn audit_log_path(&self) -> &Path {
        &self.audit_log_path
    }

    /// Execute a write transaction against `registry` and audit the outcome.
    pub fn with_write<F, R>(
        &self,
        pool: &RegistryPool,
        registry: &str,
        op_name: &str,
        f: F,
    ) -> Result<R, StarlogError>
    where
        F: FnOnce(&Connection) -> Result<R, StarlogError>,
    {
        let result = pool.with_write(registry, f);
        let status = match &result {
            Ok(_) => "success".to_string(),
            Err(e) => format!("error:{}", e.kind()),
        };
        tracing::debug!(op = op_name, %registry, %status, "registry write");
        // The write has already committed or rolled back; its outcome stands.
        if let Err(e) = self.log_event(op_name, registry, &status) {
            tracing::warn!(op = op_name, %registry, error = %e, "audit append failed");
        }
        result
    }

    fn log_event(&self, op: &str, registry: &str, status: &str) -> Result<(), StarlogError> {
        let ev = BrokerEvent {
            ts: time::now_rfc3339(),
            event_id: time::new_event_id(),
            actor: self.actor.clone(),
            op: op.to_string(),
            registry: registry.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

/// Read back the audit trail, oldest first. Malformed lines are skipped.
pub fn read_audit_log(path: &Path) -> Result<Vec<BrokerEvent>, StarlogError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect())
}
