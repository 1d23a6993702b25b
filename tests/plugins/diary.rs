use chrono::{DateTime, Utc};
use starlog::core::models::PriorityLevel;
use starlog::core::project::init_project;
use starlog::core::store::DocumentStore;
use starlog::plugins::diary::{Diary, NewDiaryEntry, format_entries};
use starlog::plugins::tracker::{
    IssuePayload, IssueTracker, JsonlIssueTracker, STATUS_IN_REVIEW, record_bug_fix,
    record_bug_report,
};
use starlog::{ErrorKind, StarlogError};
use tempfile::{TempDir, tempdir};

fn demo() -> (TempDir, TempDir, DocumentStore) {
    let data = tempdir().unwrap();
    let proj = tempdir().unwrap();
    let store = DocumentStore::open(data.path(), "tester").unwrap();
    init_project(&store, proj.path(), "demo", "").unwrap();
    (data, proj, store)
}

fn at(ts: &str) -> Option<DateTime<Utc>> {
    Some(ts.parse().unwrap())
}

struct FailingTracker;

impl IssueTracker for FailingTracker {
    fn file_issue(&self, _payload: &IssuePayload) -> Result<String, StarlogError> {
        Err(StarlogError::ExternalDependencyFailure("tracker offline".into()))
    }

    fn set_status(&self, _issue_id: &str, _status: &str) -> Result<(), StarlogError> {
        Err(StarlogError::ExternalDependencyFailure("tracker offline".into()))
    }
}

#[test]
fn entry_round_trips_with_optional_fields() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let added = diary
        .add_entry(NewDiaryEntry {
            insights: Some("the cache was stale".into()),
            file_context: Some("src/cache.rs".into()),
            ..NewDiaryEntry::new("Found a stale cache")
        })
        .unwrap();

    let loaded = diary.get(&added.id).unwrap();
    assert_eq!(loaded, added);
    assert_eq!(loaded.priority_level, PriorityLevel::Normal);
}

#[test]
fn invariants_are_checked_on_add() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");

    let fix_without_issue = NewDiaryEntry {
        is_bug_fix: true,
        ..NewDiaryEntry::new("fixed it")
    };
    assert_eq!(
        diary.add_entry(fix_without_issue).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let both = NewDiaryEntry {
        is_bug_fix: true,
        is_bug_report: true,
        external_issue_id: Some("1".into()),
        ..NewDiaryEntry::new("confused")
    };
    assert_eq!(
        diary.add_entry(both).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    let auto = diary
        .add_entry(NewDiaryEntry {
            auto_tagged: true,
            ..NewDiaryEntry::new("urgent")
        })
        .unwrap();
    assert_eq!(auto.priority_level, PriorityLevel::Auto);
    assert_eq!(diary.entries().unwrap().len(), 1);
}

#[test]
fn recent_is_newest_first_and_between_is_half_open() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    for (content, ts) in [
        ("one", "2025-01-01T10:00:00Z"),
        ("two", "2025-01-01T11:00:00Z"),
        ("three", "2025-01-01T12:00:00Z"),
    ] {
        diary
            .add_entry(NewDiaryEntry {
                timestamp: at(ts),
                ..NewDiaryEntry::new(content)
            })
            .unwrap();
    }

    let recent: Vec<_> = diary.recent(2).unwrap().into_iter().map(|e| e.content).collect();
    assert_eq!(recent, vec!["three", "two"]);

    let between: Vec<_> = diary
        .entries_between(
            "2025-01-01T10:00:00Z".parse().unwrap(),
            Some("2025-01-01T11:00:00Z".parse().unwrap()),
        )
        .unwrap()
        .into_iter()
        .map(|e| e.content)
        .collect();
    assert_eq!(between, vec!["two"]);

    let err = diary
        .entries_between(
            "2025-01-02T00:00:00Z".parse().unwrap(),
            Some("2025-01-01T00:00:00Z".parse().unwrap()),
        )
        .unwrap_err();
    assert!(matches!(err, StarlogError::InvalidRange { .. }));
}

#[test]
fn bug_report_files_an_issue_and_fix_moves_it_to_review() {
    let (data, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let tracker = JsonlIssueTracker::new(data.path());

    let report = record_bug_report(&diary, &tracker, NewDiaryEntry::new("Lexer drops CRLF")).unwrap();
    assert!(report.issue_error.is_none());
    let issue_id = report.entry.external_issue_id.clone().unwrap();
    assert_eq!(
        diary.get(&report.entry.id).unwrap().external_issue_id.as_deref(),
        Some(issue_id.as_str())
    );

    let fix = record_bug_fix(
        &diary,
        &tracker,
        NewDiaryEntry {
            external_issue_id: Some(issue_id.clone()),
            ..NewDiaryEntry::new("Normalize line endings")
        },
    )
    .unwrap();
    assert!(fix.entry.is_bug_fix);
    assert!(fix.issue_error.is_none());
    assert_eq!(
        tracker.status(&issue_id).unwrap().as_deref(),
        Some(STATUS_IN_REVIEW)
    );
}

#[test]
fn tracker_failure_keeps_the_entry() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let outcome = record_bug_report(&diary, &FailingTracker, NewDiaryEntry::new("Crash on start")).unwrap();
    assert!(outcome.issue_error.unwrap().contains("tracker offline"));
    assert!(outcome.entry.external_issue_id.is_none());
    assert!(diary.get(&outcome.entry.id).unwrap().is_bug_report);
}

#[test]
fn view_lists_newest_first() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    diary
        .add_entry(NewDiaryEntry {
            timestamp: at("2025-03-01T08:00:00Z"),
            ..NewDiaryEntry::new("older")
        })
        .unwrap();
    diary
        .add_entry(NewDiaryEntry {
            timestamp: at("2025-03-02T08:00:00Z"),
            ..NewDiaryEntry::new("newer")
        })
        .unwrap();
    let out = format_entries(&diary.entries().unwrap());
    assert!(out.find("newer").unwrap() < out.find("older").unwrap());
    assert!(out.contains("**2025-03-02T08:00**"));
}
