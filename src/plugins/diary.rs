//! Debug diary: the running status log of a project.
//!
//! Entries are append-only. The only mutations after creation are attaching
//! an external issue id and promotion to AUTO (see [`scheduler`](super::scheduler)).

use crate::core::error::StarlogError;
use crate::core::models::{DiaryEntry, PriorityLevel};
use crate::core::project::Project;
use crate::core::store::{DIARY, DocumentStore};
use crate::core::time;
use crate::plugins::scheduler;
use crate::plugins::tracker::{self, JsonlIssueTracker};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewDiaryEntry {
    pub content: String,
    #[serde(default)]
    pub insights: Option<String>,
    #[serde(default)]
    pub file_context: Option<String>,
    #[serde(default)]
    pub is_bug_report: bool,
    #[serde(default)]
    pub is_bug_fix: bool,
    #[serde(default)]
    pub external_issue_id: Option<String>,
    #[serde(default)]
    pub auto_tagged: bool,
    /// Defaults to now.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewDiaryEntry {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            ..Self::default()
        }
    }
}

pub struct Diary<'s> {
    store: &'s DocumentStore,
    project: String,
}

impl<'s> Diary<'s> {
    pub fn new(store: &'s DocumentStore, project: &str) -> Self {
        Self {
            store,
            project: project.to_string(),
        }
    }

    pub fn store(&self) -> &'s DocumentStore {
        self.store
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn add_entry(&self, new: NewDiaryEntry) -> Result<DiaryEntry, StarlogError> {
        let mut entry = DiaryEntry::new(&new.content);
        if let Some(ts) = new.timestamp {
            entry.timestamp = ts;
        }
        entry.insights = new.insights.filter(|s| !s.trim().is_empty());
        entry.file_context = new.file_context.filter(|s| !s.trim().is_empty());
        entry.is_bug_report = new.is_bug_report;
        entry.is_bug_fix = new.is_bug_fix;
        entry.external_issue_id = new.external_issue_id.filter(|s| !s.trim().is_empty());
        if new.auto_tagged {
            entry.auto_tagged = true;
            entry.priority_level = PriorityLevel::Auto;
        }
        entry.validate()?;

        self.store
            .transact(&self.project, DIARY, "diary.add", |tx| {
                tx.insert(&entry.id, &serde_json::to_value(&entry)?)
            })?;
        tracing::info!(project = %self.project, id = %entry.id, auto = entry.is_auto(), "diary entry added");
        Ok(entry)
    }

    pub fn get(&self, id: &str) -> Result<DiaryEntry, StarlogError> {
        self.store.get_as(&self.project, DIARY, id)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> Result<Vec<DiaryEntry>, StarlogError> {
        let mut entries: Vec<DiaryEntry> = self.store.get_all_as(&self.project, DIARY)?;
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Result<Vec<DiaryEntry>, StarlogError> {
        let mut entries = self.entries()?;
        entries.reverse();
        entries.truncate(n);
        Ok(entries)
    }

    /// Entries with `start < timestamp` and, when `end` is given,
    /// `timestamp <= end`; oldest first.
    pub fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<DiaryEntry>, StarlogError> {
        if let Some(end) = end
            && end < start
        {
            return Err(StarlogError::InvalidRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.timestamp > start && end.is_none_or(|end| e.timestamp <= end))
            .collect())
    }

    pub fn set_external_issue(&self, id: &str, issue_id: &str) -> Result<DiaryEntry, StarlogError> {
        self.store
            .transact(&self.project, DIARY, "diary.link_issue", |tx| {
                let mut entry: DiaryEntry = tx.get_as(id)?;
                entry.external_issue_id = Some(issue_id.to_string());
                entry.validate()?;
                tx.put_as(id, &entry)?;
                Ok(entry)
            })
    }
}

/// Newest first, with insight, file and issue annotations.
pub fn format_entries(entries: &[DiaryEntry]) -> String {
    if entries.is_empty() {
        return "Debug Diary (Empty)\n\nNo debug entries yet.".to_string();
    }
    let mut sorted: Vec<&DiaryEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));

    let mut out = String::from("Debug Diary\n\n");
    for e in sorted {
        let auto = if e.is_auto() { " [AUTO]" } else { "" };
        out.push_str(&format!("**{}** `{}`{}\n", time::short_minute(&e.timestamp), e.id, auto));
        out.push_str(&format!("{}\n", e.content));
        if let Some(insights) = &e.insights {
            out.push_str(&format!("*Insights*: {}\n", insights));
        }
        if let Some(file) = &e.file_context {
            out.push_str(&format!("*File*: `{}`\n", file));
        }
        match (&e.external_issue_id, e.is_bug_report, e.is_bug_fix) {
            (Some(issue), true, _) => out.push_str(&format!("*Issue*: {}\n", issue)),
            (Some(issue), _, true) => out.push_str(&format!("*Fixed issue*: {}\n", issue)),
            _ => {}
        }
        out.push_str("\n---\n\n");
    }
    out.trim_end().to_string()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "diary", about = "Debug diary and the actionable queue.")]
pub struct DiaryCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    path: PathBuf,
    #[clap(subcommand)]
    command: DiaryCommand,
}

#[derive(Subcommand, Debug)]
pub enum DiaryCommand {
    /// Show entries, newest first.
    View {
        #[clap(long)]
        limit: Option<usize>,
    },
    /// Record an entry.
    Add {
        #[clap(value_name = "CONTENT")]
        content: String,
        #[clap(long)]
        insights: Option<String>,
        #[clap(long = "file")]
        file_context: Option<String>,
        /// File an issue for this entry in the local tracker.
        #[clap(long, conflicts_with = "bug_fix")]
        bug_report: bool,
        /// Mark the referenced issue as fixed (requires --issue).
        #[clap(long, requires = "issue")]
        bug_fix: bool,
        #[clap(long)]
        issue: Option<String>,
        /// Tag AUTO: schedule ahead of every normal entry.
        #[clap(long)]
        auto: bool,
    },
    /// Show the next actionable entry.
    Next,
    /// Tag an entry AUTO.
    Promote {
        #[clap(long)]
        id: String,
    },
    /// Show the actionable queue in scheduling order.
    Queue,
}

pub fn run_diary_cli(store: &DocumentStore, cli: DiaryCli) -> Result<(), StarlogError> {
    let project = Project::open(&cli.path)?;
    let diary = Diary::new(store, &project.name);
    let (out, text) = match cli.command {
        DiaryCommand::View { limit } => {
            let entries = match limit {
                Some(n) => diary.recent(n)?,
                None => diary.entries()?,
            };
            let text = format_entries(&entries);
            (
                time::command_envelope("diary.view", "ok", serde_json::json!({ "entries": entries })),
                text,
            )
        }
        DiaryCommand::Add {
            content,
            insights,
            file_context,
            bug_report,
            bug_fix,
            issue,
            auto,
        } => {
            let new = NewDiaryEntry {
                content,
                insights,
                file_context,
                is_bug_report: bug_report,
                is_bug_fix: bug_fix,
                external_issue_id: issue,
                auto_tagged: auto,
                timestamp: None,
            };
            let tracker = JsonlIssueTracker::new(store.root());
            let outcome = if bug_report {
                tracker::record_bug_report(&diary, &tracker, new)?
            } else if bug_fix {
                tracker::record_bug_fix(&diary, &tracker, new)?
            } else {
                tracker::IssueOutcome {
                    entry: diary.add_entry(new)?,
                    issue_error: None,
                }
            };
            let mut text = format!("Added debug entry {}", outcome.entry.id);
            if let Some(issue) = &outcome.entry.external_issue_id {
                text.push_str(&format!(" (issue {})", issue));
            }
            if let Some(err) = &outcome.issue_error {
                text.push_str(&format!(" (issue tracker failed: {})", err));
            }
            (
                time::command_envelope(
                    "diary.add",
                    "ok",
                    serde_json::json!({ "entry": outcome.entry, "issue_error": outcome.issue_error }),
                ),
                text,
            )
        }
        DiaryCommand::Next => {
            let next = scheduler::next_actionable(&diary.entries()?);
            let text = match &next {
                Some(e) => scheduler::describe(e),
                None => scheduler::NOTHING_QUEUED.to_string(),
            };
            (
                time::command_envelope("diary.next", "ok", serde_json::json!({ "entry": next })),
                text,
            )
        }
        DiaryCommand::Promote { id } => {
            let changed = scheduler::promote_to_auto(&diary, &id)?;
            let text = if changed {
                format!("Promoted {} to AUTO", id)
            } else {
                format!("{} is already AUTO", id)
            };
            (
                time::command_envelope(
                    "diary.promote",
                    "ok",
                    serde_json::json!({ "id": id, "changed": changed }),
                ),
                text,
            )
        }
        DiaryCommand::Queue => {
            let queue = scheduler::order(diary.entries()?);
            let text = if queue.is_empty() {
                scheduler::NOTHING_QUEUED.to_string()
            } else {
                queue
                    .iter()
                    .enumerate()
                    .map(|(i, e)| format!("{}. {}", i + 1, scheduler::describe(e)))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            (
                time::command_envelope("diary.queue", "ok", serde_json::json!({ "queue": queue })),
                text,
            )
        }
    };
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&out)?),
        OutputFormat::Text => println!("{}", text),
    }
    Ok(())
}
