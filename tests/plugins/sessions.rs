use chrono::NaiveDate;
use starlog::core::models::INCOMPLETE_SESSION_MARKER;
use starlog::core::project::init_project;
use starlog::core::store::DocumentStore;
use starlog::plugins::sessions::{NewSession, Progress, SessionManager, SessionQuery, format_history};
use starlog::{ErrorKind, StarlogError};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::{TempDir, tempdir};

fn demo() -> (TempDir, TempDir, DocumentStore) {
    let data = tempdir().unwrap();
    let proj = tempdir().unwrap();
    let store = DocumentStore::open(data.path(), "tester").unwrap();
    init_project(&store, proj.path(), "demo", "").unwrap();
    (data, proj, store)
}

fn dated(title: &str, ts: &str) -> NewSession {
    NewSession {
        started_at: Some(ts.parse().unwrap()),
        goals: vec!["ship it".into()],
        ..NewSession::new(title, "begin")
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn second_start_conflicts_until_the_first_ends() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");

    let t1 = sessions.start(NewSession::new("T1", "first")).unwrap();
    let err = sessions.start(NewSession::new("T2", "second")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
    assert!(matches!(err, StarlogError::SessionAlreadyOpen(ref id) if *id == t1.id));

    let closed = sessions.end("done with T1").unwrap();
    assert_eq!(closed.id, t1.id);
    assert!(!closed.is_open());
    assert!(closed.end_timestamp.unwrap() >= closed.timestamp);

    let t2 = sessions.start(NewSession::new("T2", "second")).unwrap();
    assert_eq!(sessions.open_session().unwrap().unwrap().id, t2.id);
}

#[test]
fn progress_and_end_require_an_open_session() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");
    let progress = Progress {
        discovery: Some("found it".into()),
        ..Progress::default()
    };
    assert_eq!(
        sessions.append_progress(progress).unwrap_err().kind(),
        ErrorKind::StateConflict
    );
    assert!(matches!(
        sessions.end("nothing to end"),
        Err(StarlogError::NoOpenSession(_))
    ));
}

#[test]
fn progress_accumulates_in_order() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");
    sessions.start(NewSession::new("Work", "go")).unwrap();
    for (d, f) in [("first", "a.rs"), ("second", "b.rs"), ("third", "a.rs")] {
        sessions
            .append_progress(Progress {
                discovery: Some(d.into()),
                file: Some(f.into()),
                challenge: None,
            })
            .unwrap();
    }
    sessions
        .append_progress(Progress {
            challenge: Some("flaky CI".into()),
            ..Progress::default()
        })
        .unwrap();

    let s = sessions.open_session().unwrap().unwrap();
    assert_eq!(s.discoveries, vec!["first", "second", "third"]);
    assert_eq!(s.files_touched.len(), 2);
    assert_eq!(s.challenges, vec!["flaky CI"]);

    let md = sessions.render(&s);
    assert!(md.contains("1. first\n2. second\n3. third"));
    assert!(md.contains("- `a.rs`"));
    assert!(md.ends_with(INCOMPLETE_SESSION_MARKER));
}

#[test]
fn recent_is_newest_first() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");
    for (title, ts) in [
        ("jan", "2025-01-10T09:00:00Z"),
        ("feb", "2025-02-10T09:00:00Z"),
        ("mar", "2025-03-10T09:00:00Z"),
    ] {
        sessions.start(dated(title, ts)).unwrap();
        sessions.end("done").unwrap();
    }
    let titles: Vec<_> = sessions.recent(2).unwrap().into_iter().map(|s| s.title).collect();
    assert_eq!(titles, vec!["mar", "feb"]);
    assert_eq!(sessions.latest().unwrap().unwrap().title, "mar");
}

#[test]
fn retrieval_by_range_and_id() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");
    let mut ids = Vec::new();
    for (title, ts) in [
        ("jan", "2025-01-10T09:00:00Z"),
        ("feb", "2025-02-10T09:00:00Z"),
    ] {
        ids.push(sessions.start(dated(title, ts)).unwrap().id);
        sessions.end("done").unwrap();
    }

    let jan = sessions.by_date_range(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
    assert_eq!(jan.len(), 1);
    assert_eq!(jan[0].title, "jan");

    let both = sessions.by_date_range(date(2025, 1, 10), date(2025, 2, 10)).unwrap();
    let titles: Vec<_> = both.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["jan", "feb"]);

    let err = sessions
        .by_date_range(date(2025, 2, 1), date(2025, 1, 1))
        .unwrap_err();
    assert!(matches!(err, StarlogError::InvalidRange { .. }));
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let by_id = sessions
        .retrieve(&SessionQuery {
            id: Some(ids[1].clone()),
            range: None,
        })
        .unwrap();
    assert_eq!(by_id[0].title, "feb");

    let outside = sessions
        .retrieve(&SessionQuery {
            id: Some(ids[1].clone()),
            range: Some((date(2025, 1, 1), date(2025, 1, 31))),
        })
        .unwrap();
    assert!(outside.is_empty());

    assert!(matches!(
        sessions.retrieve(&SessionQuery::default()),
        Err(StarlogError::AmbiguousQuery)
    ));
    assert_eq!(
        sessions.by_id("session_missing").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn history_marks_open_sessions() {
    let (_d, _p, store) = demo();
    let sessions = SessionManager::new(&store, "demo");
    sessions.start(dated("old", "2025-01-10T09:00:00Z")).unwrap();
    sessions.end("done").unwrap();
    sessions.start(dated("current", "2025-01-11T09:00:00Z")).unwrap();

    let out = format_history(&sessions.all().unwrap());
    assert!(out.contains("current"));
    assert!(out.contains("🔄 IN PROGRESS"));
    assert!(out.contains("✅ COMPLETE"));
    assert!(out.find("current").unwrap() < out.find("old").unwrap());
}

#[test]
fn concurrent_starts_admit_exactly_one() {
    let (_d, _p, store) = demo();
    let store = Arc::new(store);
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                SessionManager::new(&store, "demo")
                    .start(NewSession::new(&format!("T{i}"), "race"))
                    .is_ok()
            })
        })
        .collect();
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(SessionManager::new(&store, "demo").all().unwrap().len(), 1);
}

#[test]
fn separate_store_handles_still_exclude_each_other() {
    let (data, _p, store) = demo();
    let other = DocumentStore::open(data.path(), "other").unwrap();
    SessionManager::new(&store, "demo")
        .start(NewSession::new("A", "a"))
        .unwrap();
    let err = SessionManager::new(&other, "demo")
        .start(NewSession::new("B", "b"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateConflict);
}
