//! Work sessions and their lifecycle.
//!
//! A project has at most one open session. `start` and `end` check and write
//! inside one transaction on the `starlog` registry, so concurrent callers
//! cannot both observe "no open session".

use crate::core::error::StarlogError;
use crate::core::models::Session;
use crate::core::project::Project;
use crate::core::store::{DocumentStore, RegistryTx, SESSIONS};
use crate::core::time;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, Default)]
pub struct NewSession {
    pub title: String,
    pub start_content: String,
    #[serde(default)]
    pub context_snapshot: String,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub relevant_docs: Vec<String>,
    /// Defaults to now.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl NewSession {
    pub fn new(title: &str, start_content: &str) -> Self {
        Self {
            title: title.to_string(),
            start_content: start_content.to_string(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub discovery: Option<String>,
    pub file: Option<String>,
    pub challenge: Option<String>,
}

impl Progress {
    fn is_empty(&self) -> bool {
        self.discovery.is_none() && self.file.is_none() && self.challenge.is_none()
    }
}

/// Lookup by id, by inclusive date range, or both (intersection).
#[derive(Debug, Clone, Default)]
pub struct SessionQuery {
    pub id: Option<String>,
    pub range: Option<(NaiveDate, NaiveDate)>,
}

pub struct SessionManager<'s> {
    store: &'s DocumentStore,
    project: String,
}

fn open_in(tx: &RegistryTx<'_>) -> Result<Option<Session>, StarlogError> {
    Ok(tx.get_all_as::<Session>()?.into_iter().find(Session::is_open))
}

fn newest_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}

impl<'s> SessionManager<'s> {
    pub fn new(store: &'s DocumentStore, project: &str) -> Self {
        Self {
            store,
            project: project.to_string(),
        }
    }

    pub fn start(&self, new: NewSession) -> Result<Session, StarlogError> {
        let timestamp = new.started_at.unwrap_or_else(time::now);
        let session = Session {
            id: time::new_document_id("session"),
            timestamp,
            date: timestamp.date_naive(),
            title: new.title,
            start_content: new.start_content,
            context_snapshot: new.context_snapshot,
            relevant_docs: new.relevant_docs,
            goals: new.goals,
            discoveries: Vec::new(),
            challenges: Vec::new(),
            files_touched: BTreeSet::new(),
            end_content: None,
            end_timestamp: None,
        };
        session.validate()?;

        self.store
            .transact(&self.project, SESSIONS, "session.start", |tx| {
                if let Some(open) = open_in(tx)? {
                    return Err(StarlogError::SessionAlreadyOpen(open.id));
                }
                tx.insert(&session.id, &serde_json::to_value(&session)?)
            })?;
        tracing::info!(project = %self.project, id = %session.id, "session started");
        Ok(session)
    }

    pub fn append_progress(&self, progress: Progress) -> Result<Session, StarlogError> {
        if progress.is_empty() {
            return Err(StarlogError::InvalidArgument(
                "progress needs a discovery, a file or a challenge".to_string(),
            ));
        }
        self.store
            .transact(&self.project, SESSIONS, "session.progress", |tx| {
                let mut session = open_in(tx)?
                    .ok_or_else(|| StarlogError::NoOpenSession(self.project.clone()))?;
                if let Some(d) = progress.discovery {
                    session.discoveries.push(d);
                }
                if let Some(f) = progress.file {
                    session.files_touched.insert(f);
                }
                if let Some(c) = progress.challenge {
                    session.challenges.push(c);
                }
                tx.put_as(&session.id, &session)?;
                Ok(session)
            })
    }

    /// Close the open session.
    pub fn end(&self, end_content: &str) -> Result<Session, StarlogError> {
        if end_content.trim().is_empty() {
            return Err(StarlogError::InvalidArgument(
                "end content cannot be empty".to_string(),
            ));
        }
        let session = self
            .store
            .transact(&self.project, SESSIONS, "session.end", |tx| {
                let mut session = open_in(tx)?
                    .ok_or_else(|| StarlogError::NoOpenSession(self.project.clone()))?;
                session.end_content = Some(end_content.to_string());
                session.end_timestamp = Some(time::now().max(session.timestamp));
                session.validate()?;
                tx.put_as(&session.id, &session)?;
                Ok(session)
            })?;
        tracing::info!(
            project = %self.project,
            id = %session.id,
            minutes = session.duration_minutes().unwrap_or(0),
            "session ended"
        );
        Ok(session)
    }

    pub fn render(&self, session: &Session) -> String {
        session.to_markdown()
    }

    /// Every session, newest first.
    pub fn all(&self) -> Result<Vec<Session>, StarlogError> {
        let mut sessions: Vec<Session> = self.store.get_all_as(&self.project, SESSIONS)?;
        newest_first(&mut sessions);
        Ok(sessions)
    }

    pub fn recent(&self, n: usize) -> Result<Vec<Session>, StarlogError> {
        let mut sessions = self.all()?;
        sessions.truncate(n);
        Ok(sessions)
    }

    pub fn latest(&self) -> Result<Option<Session>, StarlogError> {
        Ok(self.all()?.into_iter().next())
    }

    pub fn open_session(&self) -> Result<Option<Session>, StarlogError> {
        Ok(self.all()?.into_iter().find(Session::is_open))
    }

    pub fn by_id(&self, id: &str) -> Result<Session, StarlogError> {
        self.store.get_as(&self.project, SESSIONS, id)
    }

    /// Sessions dated within `[start, end]`, oldest first.
    pub fn by_date_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Session>, StarlogError> {
        check_range(start, end)?;
        let mut sessions: Vec<Session> = self
            .all()?
            .into_iter()
            .filter(|s| s.date >= start && s.date <= end)
            .collect();
        sessions.reverse();
        Ok(sessions)
    }

    pub fn retrieve(&self, query: &SessionQuery) -> Result<Vec<Session>, StarlogError> {
        match (&query.id, query.range) {
            (None, None) => Err(StarlogError::AmbiguousQuery),
            (Some(id), None) => Ok(vec![self.by_id(id)?]),
            (None, Some((start, end))) => self.by_date_range(start, end),
            (Some(id), Some((start, end))) => {
                check_range(start, end)?;
                let session = self.by_id(id)?;
                Ok(if session.date >= start && session.date <= end {
                    vec![session]
                } else {
                    Vec::new()
                })
            }
        }
    }
}

fn check_range(start: NaiveDate, end: NaiveDate) -> Result<(), StarlogError> {
    if start > end {
        return Err(StarlogError::InvalidRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    Ok(())
}

/// One line per session, newest first, with status and the first two goals.
pub fn format_history(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "STARLOG Sessions (Empty)\n\nNo sessions found.".to_string();
    }
    let mut sorted = sessions.to_vec();
    newest_first(&mut sorted);

    let mut out = String::from("STARLOG Sessions\n\n");
    for s in &sorted {
        let status = match s.duration_minutes() {
            Some(minutes) => format!("✅ COMPLETE ({}min)", minutes),
            None => "🔄 IN PROGRESS".to_string(),
        };
        out.push_str(&format!("**{}** - {} `{}` {}\n", s.date, s.title, s.id, status));
        if !s.goals.is_empty() {
            let shown: Vec<&str> = s.goals.iter().take(2).map(String::as_str).collect();
            let more = if s.goals.len() > 2 { "..." } else { "" };
            out.push_str(&format!("Goals: {}{}\n", shown.join(", "), more));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[clap(name = "session", about = "Start, track and review work sessions.")]
pub struct SessionCli {
    /// Output format for this command group.
    #[clap(long, global = true, value_enum, default_value = "text")]
    format: OutputFormat,
    /// Project directory.
    #[clap(long, global = true, default_value = ".")]
    path: PathBuf,
    #[clap(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Show the most recent sessions in full.
    View {
        #[clap(long, default_value_t = 3)]
        limit: usize,
    },
    /// Open a session.
    Start {
        #[clap(value_name = "TITLE")]
        title: String,
        #[clap(long = "start")]
        start_content: String,
        #[clap(long, default_value = "")]
        context: String,
        /// Session goal (repeatable).
        #[clap(long = "goal")]
        goals: Vec<String>,
        /// Document consulted for this session (repeatable).
        #[clap(long = "doc")]
        relevant_docs: Vec<String>,
    },
    /// Record progress on the open session.
    Progress {
        #[clap(long)]
        discovery: Option<String>,
        #[clap(long)]
        file: Option<String>,
        #[clap(long)]
        challenge: Option<String>,
    },
    /// Close the open session.
    End {
        #[clap(value_name = "SUMMARY")]
        end_content: String,
    },
    /// Fetch sessions by id and/or inclusive date range (YYYY-MM-DD).
    Retrieve {
        #[clap(long)]
        id: Option<String>,
        #[clap(long, requires = "to")]
        from: Option<NaiveDate>,
        #[clap(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    /// One-line summary of every session.
    History,
}

fn render_all(manager: &SessionManager<'_>, sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions found.".to_string();
    }
    sessions
        .iter()
        .map(|s| manager.render(s))
        .collect::<Vec<_>>()
        .join("")
        .trim_end()
        .to_string()
}

pub fn run_session_cli(store: &DocumentStore, cli: SessionCli) -> Result<(), StarlogError> {
    let project = Project::open(&cli.path)?;
    let manager = SessionManager::new(store, &project.name);
    let (out, text) = match cli.command {
        SessionCommand::View { limit } => {
            let sessions = manager.recent(limit)?;
            let text = render_all(&manager, &sessions);
            (
                time::command_envelope("session.view", "ok", serde_json::json!({ "sessions": sessions })),
                text,
            )
        }
        SessionCommand::Start {
            title,
            start_content,
            context,
            goals,
            relevant_docs,
        } => {
            let session = manager.start(NewSession {
                context_snapshot: context,
                goals,
                relevant_docs,
                ..NewSession::new(&title, &start_content)
            })?;
            let text = format!("Started session {}: {}", session.id, session.title);
            (
                time::command_envelope("session.start", "ok", serde_json::json!({ "session": session })),
                text,
            )
        }
        SessionCommand::Progress {
            discovery,
            file,
            challenge,
        } => {
            let session = manager.append_progress(Progress {
                discovery,
                file,
                challenge,
            })?;
            let text = format!("Updated session {}", session.id);
            (
                time::command_envelope("session.progress", "ok", serde_json::json!({ "session": session })),
                text,
            )
        }
        SessionCommand::End { end_content } => {
            let session = manager.end(&end_content)?;
            let text = format!(
                "Ended session {}: {} (duration: {} minutes)",
                session.id,
                session.title,
                session.duration_minutes().unwrap_or(0)
            );
            (
                time::command_envelope("session.end", "ok", serde_json::json!({ "session": session })),
                text,
            )
        }
        SessionCommand::Retrieve { id, from, to } => {
            let query = SessionQuery {
                id,
                range: from.zip(to),
            };
            let sessions = manager.retrieve(&query)?;
            let text = render_all(&manager, &sessions);
            (
                time::command_envelope("session.retrieve", "ok", serde_json::json!({ "sessions": sessions })),
                text,
            )
        }
        SessionCommand::History => {
            let sessions = manager.all()?;
            let text = format_history(&sessions);
            (
                time::command_envelope("session.history", "ok", serde_json::json!({ "sessions": sessions })),
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
