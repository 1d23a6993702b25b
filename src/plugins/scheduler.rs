//! Priority scheduling over diary entries.
//!
//! AUTO entries come strictly before normal ones; within a class the oldest
//! entry comes first, ties broken by id. The order is recomputed from the
//! snapshot on every call and never stored.

use crate::core::error::StarlogError;
use crate::core::models::DiaryEntry;
use crate::core::store::DIARY;
use crate::plugins::diary::Diary;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;

pub const NOTHING_QUEUED: &str = "*Nothing queued*";

fn schedule_cmp(a: &DiaryEntry, b: &DiaryEntry) -> Ordering {
    b.is_auto()
        .cmp(&a.is_auto())
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.id.cmp(&b.id))
}

/// Issue ids that some bug-fix entry in `entries` has closed.
fn closed_issues(entries: &[DiaryEntry]) -> FxHashSet<&str> {
    entries
        .iter()
        .filter(|e| e.is_bug_fix)
        .filter_map(|e| e.external_issue_id.as_deref())
        .collect()
}

/// Bug fixes close work and are never actionable, nor is a bug report whose
/// issue a fix has already closed.
fn is_actionable(entry: &DiaryEntry, closed: &FxHashSet<&str>) -> bool {
    if entry.is_bug_fix {
        return false;
    }
    !(entry.is_bug_report
        && entry
            .external_issue_id
            .as_deref()
            .is_some_and(|issue| closed.contains(issue)))
}

/// Actionable entries in scheduling order.
pub fn order(entries: Vec<DiaryEntry>) -> Vec<DiaryEntry> {
    let closed = closed_issues(&entries);
    let mut queue: Vec<DiaryEntry> = entries
        .iter()
        .filter(|e| is_actionable(e, &closed))
        .cloned()
        .collect();
    queue.sort_by(schedule_cmp);
    queue
}

pub fn next_actionable(entries: &[DiaryEntry]) -> Option<DiaryEntry> {
    let closed = closed_issues(entries);
    entries
        .iter()
        .filter(|e| is_actionable(e, &closed))
        .min_by(|a, b| schedule_cmp(a, b))
        .cloned()
}

/// Tag an entry AUTO. Returns `false` when it already was.
pub fn promote_to_auto(diary: &Diary<'_>, id: &str) -> Result<bool, StarlogError> {
    let changed = diary
        .store()
        .transact(diary.project(), DIARY, "diary.promote", |tx| {
            let mut entry: DiaryEntry = tx.get_as(id)?;
            if !entry.promote() {
                return Ok(false);
            }
            tx.put_as(id, &entry)?;
            Ok(true)
        })?;
    if changed {
        tracing::info!(project = diary.project(), %id, "entry promoted to AUTO");
    }
    Ok(changed)
}

/// `[AUTO] content (id)` or `content (id)`.
pub fn describe(entry: &DiaryEntry) -> String {
    if entry.is_auto() {
        format!("[AUTO] {} ({})", entry.content, entry.id)
    } else {
        format!("{} ({})", entry.content, entry.id)
    }
}
