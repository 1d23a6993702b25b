use starlog::core::project::init_project;
use starlog::core::store::DocumentStore;
use starlog::plugins::flight::{
    FLIGHT_FILE, FlightDeck, FlightPlan, FlightView, FlyQuery, NewFlight,
};
use starlog::{ErrorKind, StarlogError};
use std::fs;
use tempfile::{TempDir, tempdir};

fn demo() -> (TempDir, TempDir, DocumentStore) {
    let data = tempdir().unwrap();
    let proj = tempdir().unwrap();
    let store = DocumentStore::open(data.path(), "tester").unwrap();
    init_project(&store, proj.path(), "demo", "").unwrap();
    (data, proj, store)
}

fn save(deck: &FlightDeck<'_>, dir: &std::path::Path, name: &str, category: &str) -> String {
    deck.save(NewFlight {
        category: category.to_string(),
        ..NewFlight::new(name, &format!("{} flow", name), dir)
    })
    .unwrap()
    .id
}

#[test]
fn empty_deck_falls_back_to_the_default_plan() {
    let (_d, proj, store) = demo();
    let deck = FlightDeck::new(&store);

    let view = deck.fly(proj.path(), &FlyQuery::default()).unwrap();
    let file = proj.path().join(FLIGHT_FILE);
    assert_eq!(view, FlightView::Default { flight_path: file.clone() });
    let written: FlightPlan = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(written, FlightPlan::starlog_default());

    fs::write(&file, "{\"kept\":true}").unwrap();
    deck.fly(proj.path(), &FlyQuery::default()).unwrap();
    assert_eq!(fs::read_to_string(&file).unwrap(), "{\"kept\":true}");
}

#[test]
fn overview_counts_categories_of_this_project_only() {
    let (_d, proj, store) = demo();
    let other = tempdir().unwrap();
    let deck = FlightDeck::new(&store);
    save(&deck, proj.path(), "Survey", "research");
    save(&deck, proj.path(), "Read papers", "research");
    save(&deck, proj.path(), "Ship it", "development");
    save(&deck, other.path(), "Elsewhere", "analysis");

    match deck.fly(proj.path(), &FlyQuery::default()).unwrap() {
        FlightView::Categories { total, counts } => {
            assert_eq!(total, 3);
            assert_eq!(counts.get("research"), Some(&2));
            assert_eq!(counts.get("development"), Some(&1));
            assert!(!counts.contains_key("analysis"));
        }
        other => panic!("expected categories, got {:?}", other),
    }

    let everywhere = FlyQuery {
        all_projects: true,
        ..FlyQuery::default()
    };
    match deck.fly(proj.path(), &everywhere).unwrap() {
        FlightView::Categories { total, counts } => {
            assert_eq!(total, 4);
            assert_eq!(counts.get("analysis"), Some(&1));
        }
        other => panic!("expected categories, got {:?}", other),
    }
}

#[test]
fn category_pages_hold_five_configs_each() {
    let (_d, proj, store) = demo();
    let deck = FlightDeck::new(&store);
    for i in 0..7 {
        save(&deck, proj.path(), &format!("Flight {}", i), "research");
    }
    save(&deck, proj.path(), "Unrelated", "development");

    let first = deck
        .fly(
            proj.path(),
            &FlyQuery {
                category: Some("research".into()),
                ..FlyQuery::default()
            },
        )
        .unwrap();
    let FlightView::Page {
        page,
        total_pages,
        total,
        items,
        ..
    } = &first
    else {
        panic!("expected a page, got {:?}", first);
    };
    assert_eq!((*page, *total_pages, *total), (1, 2, 7));
    assert_eq!(items.iter().map(|i| i.number).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert!(items.iter().all(|i| i.category == "research"));
    let text = first.render();
    assert!(text.starts_with("Research Flight Configs (7 configs, page 1/2):"));
    assert!(text.contains("--page 2 --category research"));

    let second = deck
        .fly(
            proj.path(),
            &FlyQuery {
                page: Some(2),
                category: Some("research".into()),
                ..FlyQuery::default()
            },
        )
        .unwrap();
    let FlightView::Page { items, .. } = &second else {
        panic!("expected a page, got {:?}", second);
    };
    assert_eq!(items.iter().map(|i| i.number).collect::<Vec<_>>(), vec![6, 7]);

    for bad in [0, 3] {
        let err = deck
            .fly(
                proj.path(),
                &FlyQuery {
                    page: Some(bad),
                    category: Some("research".into()),
                    ..FlyQuery::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}

#[test]
fn unknown_category_falls_back_to_default() {
    let (_d, proj, store) = demo();
    let deck = FlightDeck::new(&store);
    save(&deck, proj.path(), "Survey", "research");
    let view = deck
        .fly(
            proj.path(),
            &FlyQuery {
                category: Some("nothing".into()),
                ..FlyQuery::default()
            },
        )
        .unwrap();
    assert!(matches!(view, FlightView::Default { .. }));
}

#[test]
fn invalid_flights_are_rejected_and_deleted_ones_are_gone() {
    let (_d, proj, store) = demo();
    let deck = FlightDeck::new(&store);

    let blank = deck.save(NewFlight::new("  ", "nothing", proj.path())).unwrap_err();
    assert_eq!(blank.kind(), ErrorKind::InvalidArgument);

    let mut plan = FlightPlan::starlog_default();
    plan.root_files.clear();
    let empty_plan = deck
        .save(NewFlight {
            plan: Some(plan),
            ..NewFlight::new("Hollow", "no waypoints", proj.path())
        })
        .unwrap_err();
    assert_eq!(empty_plan.kind(), ErrorKind::InvalidArgument);
    assert!(deck.all().unwrap().is_empty());

    let id = save(&deck, proj.path(), "Survey", "research");
    let stored = deck.get(&id).unwrap();
    assert_eq!(stored.name, "Survey");
    assert_eq!(stored.flight_config, FlightPlan::starlog_default());

    deck.delete(&id).unwrap();
    assert!(matches!(deck.get(&id), Err(StarlogError::NotFound(_))));
    assert!(deck.all().unwrap().is_empty());
}
