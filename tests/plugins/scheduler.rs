use starlog::core::project::init_project;
use starlog::core::store::DocumentStore;
use starlog::plugins::diary::{Diary, NewDiaryEntry};
use starlog::plugins::scheduler::{next_actionable, order, promote_to_auto};
use starlog::plugins::tracker::{JsonlIssueTracker, record_bug_fix, record_bug_report};
use starlog::ErrorKind;
use tempfile::{TempDir, tempdir};

fn demo() -> (TempDir, TempDir, DocumentStore) {
    let data = tempdir().unwrap();
    let proj = tempdir().unwrap();
    let store = DocumentStore::open(data.path(), "tester").unwrap();
    init_project(&store, proj.path(), "demo", "").unwrap();
    (data, proj, store)
}

fn add(diary: &Diary<'_>, content: &str, ts: &str) -> String {
    diary
        .add_entry(NewDiaryEntry {
            timestamp: Some(ts.parse().unwrap()),
            ..NewDiaryEntry::new(content)
        })
        .unwrap()
        .id
}

#[test]
fn promoted_entry_jumps_the_queue() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let e1 = add(&diary, "e1", "2025-01-01T00:00:01Z");
    let e2 = add(&diary, "e2", "2025-01-01T00:00:02Z");

    assert_eq!(next_actionable(&diary.entries().unwrap()).unwrap().id, e1);

    assert!(promote_to_auto(&diary, &e2).unwrap());
    assert_eq!(next_actionable(&diary.entries().unwrap()).unwrap().id, e2);

    let ids: Vec<_> = order(diary.entries().unwrap()).into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![e2, e1]);
}

#[test]
fn promotion_is_idempotent() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let id = add(&diary, "only", "2025-01-01T00:00:00Z");

    assert!(promote_to_auto(&diary, &id).unwrap());
    let once = diary.get(&id).unwrap();
    assert!(!promote_to_auto(&diary, &id).unwrap());
    let twice = diary.get(&id).unwrap();
    assert_eq!(once, twice);
    assert!(twice.auto_tagged);
}

#[test]
fn promoting_a_missing_entry_is_not_found() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    assert_eq!(
        promote_to_auto(&diary, "diary_missing").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn auto_entries_stay_fifo_among_themselves() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let a = add(&diary, "a", "2025-01-01T00:00:01Z");
    let b = add(&diary, "b", "2025-01-01T00:00:02Z");
    let c = add(&diary, "c", "2025-01-01T00:00:03Z");
    promote_to_auto(&diary, &c).unwrap();
    promote_to_auto(&diary, &b).unwrap();

    let ids: Vec<_> = order(diary.entries().unwrap()).into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![b, c, a]);
}

#[test]
fn empty_diary_has_nothing_actionable() {
    let (_d, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    assert!(next_actionable(&diary.entries().unwrap()).is_none());
}

#[test]
fn fixed_bug_report_is_no_longer_next() {
    let (data, _p, store) = demo();
    let diary = Diary::new(&store, "demo");
    let tracker = JsonlIssueTracker::new(data.path());

    let report = record_bug_report(&diary, &tracker, NewDiaryEntry::new("parser crash")).unwrap();
    let issue = report.entry.external_issue_id.clone().unwrap();
    assert_eq!(
        next_actionable(&diary.entries().unwrap()).unwrap().id,
        report.entry.id
    );

    record_bug_fix(
        &diary,
        &tracker,
        NewDiaryEntry {
            external_issue_id: Some(issue),
            ..NewDiaryEntry::new("guard against empty input")
        },
    )
    .unwrap();
    let pending = diary
        .add_entry(NewDiaryEntry::new("real pending work"))
        .unwrap();

    let entries = diary.entries().unwrap();
    assert_eq!(next_actionable(&entries).unwrap().id, pending.id);
    let ids: Vec<_> = order(entries).into_iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![pending.id]);
}
