//! Context assembly: render the project template against current registry
//! contents.

use crate::core::collaborators::{CodeLoader, CommandCodeLoader, FileReader, FsFileReader};
use crate::core::config::DEFAULT_RECENT_DIARY_ENTRIES;
use crate::core::error::StarlogError;
use crate::core::models::{DiaryEntry, Session};
use crate::core::project::Project;
use crate::core::resolver::{Resolver, ResolverOptions};
use crate::core::store::DocumentStore;
use crate::core::template;
use crate::core::time;
use crate::plugins::diary::Diary;
use crate::plugins::scheduler;
use crate::plugins::sessions::SessionManager;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tiktoken_rs::cl100k_base;

pub const NO_SESSIONS: &str = "*No sessions found*";
pub const NO_DEBUG_ENTRIES: &str = "*No debug entries*";
pub const SESSION_IN_PROGRESS: &str = "*Session in progress*";
pub const NO_SESSION_END: &str = "*No session end*";
pub const NO_DIARY_ENTRIES: &str = "*No debug diary entries*";

#[derive(Debug, Clone, Copy)]
pub struct OrientOptions {
    pub recent_diary_entries: usize,
    pub resolver: ResolverOptions,
}

impl Default for OrientOptions {
    fn default() -> Self {
        Self {
            recent_diary_entries: DEFAULT_RECENT_DIARY_ENTRIES,
            resolver: ResolverOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrientReport {
    pub project: String,
    pub context: String,
    pub estimated_tokens: usize,
}

pub fn estimate_tokens(text: &str) -> Result<usize, StarlogError> {
    let bpe = cl100k_base().map_err(|e| {
        StarlogError::ExternalDependencyFailure(format!("tokenizer unavailable: {}", e))
    })?;
    Ok(bpe.encode_with_special_tokens(text).len())
}

/// Assemble context for the project in `dir`, reading files and running
/// modules relative to it.
pub fn orient(
    store: &DocumentStore,
    dir: &Path,
    options: &OrientOptions,
) -> Result<OrientReport, StarlogError> {
    let project = Project::open(dir)?;
    let files: Arc<dyn FileReader> = Arc::new(FsFileReader::new(&project.dir));
    let code: Arc<dyn CodeLoader> = Arc::new(CommandCodeLoader::new(&project.dir));
    orient_with(store, &project, files, code, options)
}

pub fn orient_with(
    store: &DocumentStore,
    project: &Project,
    files: Arc<dyn FileReader>,
    code: Arc<dyn CodeLoader>,
    options: &OrientOptions,
) -> Result<OrientReport, StarlogError> {
    let vars = context_variables(store, project, options)?;
    let resolver = Resolver::new(store, &project.name, files, code).with_options(options.resolver);
    let context = template::render(&project.template, &resolver, &vars);
    let estimated_tokens = estimate_tokens(&context)?;
    tracing::debug!(project = %project.name, estimated_tokens, "context assembled");
    Ok(OrientReport {
        project: project.name.clone(),
        context,
        estimated_tokens,
    })
}

/// Variables available to static template blocks.
pub fn context_variables(
    store: &DocumentStore,
    project: &Project,
    options: &OrientOptions,
) -> Result<BTreeMap<String, String>, StarlogError> {
    let diary = Diary::new(store, &project.name);
    let latest = SessionManager::new(store, &project.name).latest()?;

    let mut vars = BTreeMap::new();
    vars.insert("project_name".to_string(), project.name.clone());
    vars.insert(
        "project_description".to_string(),
        project.template.metadata.project_description.clone(),
    );
    vars.insert(
        "session_start_content".to_string(),
        session_start(latest.as_ref()),
    );
    vars.insert(
        "debug_logs_content".to_string(),
        session_debug_logs(&diary, latest.as_ref())?,
    );
    vars.insert("session_end_content".to_string(), session_end(latest.as_ref()));

    let recent = diary.recent(options.recent_diary_entries)?;
    vars.insert("current_status".to_string(), current_status(&recent));

    let next = scheduler::next_actionable(&diary.entries()?);
    vars.insert(
        "next_actionable".to_string(),
        next.as_ref()
            .map(scheduler::describe)
            .unwrap_or_else(|| scheduler::NOTHING_QUEUED.to_string()),
    );
    Ok(vars)
}

fn session_start(latest: Option<&Session>) -> String {
    match latest {
        Some(s) => format!("**{}**\n{}", s.title, s.start_content),
        None => NO_SESSIONS.to_string(),
    }
}

fn session_end(latest: Option<&Session>) -> String {
    match latest {
        Some(s) => match &s.end_content {
            Some(end) => end.clone(),
            None => SESSION_IN_PROGRESS.to_string(),
        },
        None => NO_SESSION_END.to_string(),
    }
}

fn session_debug_logs(diary: &Diary<'_>, latest: Option<&Session>) -> Result<String, StarlogError> {
    let Some(session) = latest else {
        return Ok(NO_DEBUG_ENTRIES.to_string());
    };
    let entries = diary.entries_between(session.timestamp, session.end_timestamp)?;
    if entries.is_empty() {
        return Ok(NO_DEBUG_ENTRIES.to_string());
    }
    Ok(entries
        .iter()
        .map(|e| format!("- {}: {}", time::short_minute(&e.timestamp), e.content))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn current_status(recent: &[DiaryEntry]) -> String {
    if recent.is_empty() {
        return NO_DIARY_ENTRIES.to_string();
    }
    recent
        .iter()
        .map(DiaryEntry::render_line)
        .collect::<Vec<_>>()
        .join("\n")
}
