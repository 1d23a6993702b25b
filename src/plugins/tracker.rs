//! Issue-tracker workflow around bug-report and bug-fix diary entries.
//!
//! The diary only stores issue ids. Filing issues and moving them between
//! states is the job of an [`IssueTracker`]; [`JsonlIssueTracker`] is the
//! local one the CLI uses.

use crate::core::error::StarlogError;
use crate::core::models::DiaryEntry;
use crate::core::schemas::ISSUE_EVENTS_NAME;
use crate::core::time;
use crate::plugins::diary::{Diary, NewDiaryEntry};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const STATUS_OPEN: &str = "open";
pub const STATUS_IN_REVIEW: &str = "in-review";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl IssuePayload {
    pub fn from_entry(entry: &DiaryEntry) -> Self {
        let mut title: String = entry.content.chars().take(72).collect();
        if entry.content.chars().count() > 72 {
            title.push_str("...");
        }
        let mut body = String::from("**Bug report from STARLOG**\n\n");
        body.push_str(&format!("**Description**: {}\n\n", entry.content));
        if let Some(insights) = &entry.insights {
            body.push_str(&format!("**Insights**: {}\n\n", insights));
        }
        if let Some(file) = &entry.file_context {
            body.push_str(&format!("**File context**: `{}`\n\n", file));
        }
        body.push_str(&format!("**Timestamp**: {}\n", time::to_rfc3339(&entry.timestamp)));
        body.push_str(&format!("**Entry ID**: {}\n", entry.id));
        Self {
            title,
            body,
            labels: vec!["bug".to_string(), "starlog".to_string()],
        }
    }
}

pub trait IssueTracker: Send + Sync {
    /// File an issue and return its tracker id.
    fn file_issue(&self, payload: &IssuePayload) -> Result<String, StarlogError>;
    fn set_status(&self, issue_id: &str, status: &str) -> Result<(), StarlogError>;
}

#[derive(Debug, Clone)]
pub struct IssueOutcome {
    pub entry: DiaryEntry,
    /// Tracker failure; the entry itself is stored regardless.
    pub issue_error: Option<String>,
}

/// Store a bug report and file an issue for it.
pub fn record_bug_report(
    diary: &Diary<'_>,
    tracker: &dyn IssueTracker,
    mut new: NewDiaryEntry,
) -> Result<IssueOutcome, StarlogError> {
    new.is_bug_report = true;
    new.is_bug_fix = false;
    let entry = diary.add_entry(new)?;
    if entry.external_issue_id.is_some() {
        return Ok(IssueOutcome {
            entry,
            issue_error: None,
        });
    }
    match tracker.file_issue(&IssuePayload::from_entry(&entry)) {
        Ok(issue_id) => {
            let entry = diary.set_external_issue(&entry.id, &issue_id)?;
            Ok(IssueOutcome {
                entry,
                issue_error: None,
            })
        }
        Err(e) => {
            tracing::warn!(id = %entry.id, error = %e, "filing issue failed");
            Ok(IssueOutcome {
                entry,
                issue_error: Some(e.to_string()),
            })
        }
    }
}

/// Store a bug fix and move its issue to in-review.
pub fn record_bug_fix(
    diary: &Diary<'_>,
    tracker: &dyn IssueTracker,
    mut new: NewDiaryEntry,
) -> Result<IssueOutcome, StarlogError> {
    new.is_bug_fix = true;
    new.is_bug_report = false;
    let entry = diary.add_entry(new)?;
    let issue_id = entry.external_issue_id.clone().unwrap_or_default();
    let issue_error = match tracker.set_status(&issue_id, STATUS_IN_REVIEW) {
        Ok(()) => None,
        Err(e) => {
            tracing::warn!(id = %entry.id, issue = %issue_id, error = %e, "issue status update failed");
            Some(e.to_string())
        }
    };
    Ok(IssueOutcome { entry, issue_error })
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IssueEvent {
    Filed {
        ts: String,
        issue_id: String,
        payload: IssuePayload,
    },
    StatusChanged {
        ts: String,
        issue_id: String,
        status: String,
    },
}

/// Appends issue events to `issues.jsonl` under the data directory.
pub struct JsonlIssueTracker {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlIssueTracker {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(ISSUE_EVENTS_NAME),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn events(&self) -> Result<Vec<IssueEvent>, StarlogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    /// Current status of `issue_id`, if it was ever filed.
    pub fn status(&self, issue_id: &str) -> Result<Option<String>, StarlogError> {
        let mut status = None;
        for event in self.events()? {
            match event {
                IssueEvent::Filed { issue_id: id, .. } if id == issue_id => {
                    status = Some(STATUS_OPEN.to_string());
                }
                IssueEvent::StatusChanged {
                    issue_id: id,
                    status: s,
                    ..
                } if id == issue_id => status = Some(s),
                _ => {}
            }
        }
        Ok(status)
    }

    fn append(&self, event: &IssueEvent) -> Result<(), StarlogError> {
        let _guard = self.lock.lock().map_err(|_| {
            StarlogError::ExternalDependencyFailure("issue log lock poisoned".to_string())
        })?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(event)?)?;
        Ok(())
    }
}

impl IssueTracker for JsonlIssueTracker {
    fn file_issue(&self, payload: &IssuePayload) -> Result<String, StarlogError> {
        let issue_id = time::new_document_id("issue");
        self.append(&IssueEvent::Filed {
            ts: time::now_rfc3339(),
            issue_id: issue_id.clone(),
            payload: payload.clone(),
        })?;
        Ok(issue_id)
    }

    fn set_status(&self, issue_id: &str, status: &str) -> Result<(), StarlogError> {
        if self.status(issue_id)?.is_none() {
            return Err(StarlogError::NotFound(format!("issue {}", issue_id)));
        }
        self.append(&IssueEvent::StatusChanged {
            ts: time::now_rfc3339(),
            issue_id: issue_id.to_string(),
            status: status.to_string(),
        })
    }
}
