use starlog::core::models::EnforcementLevel;
use starlog::core::project::init_project;
use starlog::core::store::DocumentStore;
use starlog::plugins::rules::{RuleBook, RuleDraft, format_rules};
use starlog::{ErrorKind, StarlogError};
use tempfile::{TempDir, tempdir};

fn demo() -> (TempDir, TempDir, DocumentStore) {
    let data = tempdir().unwrap();
    let proj = tempdir().unwrap();
    let store = DocumentStore::open(data.path(), "tester").unwrap();
    init_project(&store, proj.path(), "demo", "").unwrap();
    (data, proj, store)
}

#[test]
fn added_rule_is_the_only_rule() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");
    let added = book.add(RuleDraft::new("Write tests", "testing")).unwrap();

    let rules = book.list().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, added.id);
    assert_eq!(rules[0].text, "Write tests");
    assert_eq!(rules[0].category, "testing");
    assert_eq!(rules[0].priority, 5);
    assert_eq!(rules[0].enforcement_level, EnforcementLevel::Warning);
    assert!(added.id.starts_with("rule_"));
}

#[test]
fn out_of_range_priority_is_rejected_before_writing() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");
    let mut draft = RuleDraft::new("Too loud", "general");
    draft.priority = Some(11);
    let err = book.add(draft).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(book.list().unwrap().is_empty());
}

#[test]
fn replace_is_all_or_nothing() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");
    let original = book.add(RuleDraft::new("Keep me", "general")).unwrap();

    let mut bad = RuleDraft::new("broken", "general");
    bad.priority = Some(0);
    let err = book
        .replace(vec![RuleDraft::new("New", "general"), bad])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(book.list().unwrap(), vec![original.clone()]);

    let mut kept = RuleDraft::new("Keep me, reworded", "general");
    kept.id = Some(original.id.clone());
    let replaced = book
        .replace(vec![kept, RuleDraft::new("Second", "style")])
        .unwrap();
    assert_eq!(replaced.len(), 2);
    let stored = book.get(&original.id).unwrap();
    assert_eq!(stored.text, "Keep me, reworded");
    assert_eq!(stored.created_at, original.created_at);
    assert_eq!(book.list().unwrap().len(), 2);
}

#[test]
fn delete_missing_rule_is_not_found() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");
    let rule = book.add(RuleDraft::new("Temporary", "general")).unwrap();
    book.delete(&rule.id).unwrap();
    assert!(matches!(
        book.delete(&rule.id),
        Err(StarlogError::NotFound(_))
    ));
}

#[test]
fn rules_for_path_matches_globs_and_sorts_by_priority() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");

    let mut rust_only = RuleDraft::new("No unwrap", "rust");
    rust_only.applies_to.insert("**/*.rs".into());
    rust_only.priority = Some(9);
    book.add(rust_only).unwrap();

    let mut docs_only = RuleDraft::new("Wrap at 80", "docs");
    docs_only.applies_to.insert("docs/**".into());
    book.add(docs_only).unwrap();

    let mut everywhere = RuleDraft::new("Be kind", "general");
    everywhere.priority = Some(2);
    book.add(everywhere).unwrap();

    let texts: Vec<_> = book
        .for_path("src/core/store.rs")
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(texts, vec!["No unwrap", "Be kind"]);
}

#[test]
fn formatted_listing_groups_categories() {
    let (_d, _p, store) = demo();
    let book = RuleBook::new(&store, "demo");
    book.add(RuleDraft::new("Write tests", "testing")).unwrap();
    let out = format_rules(&book.list().unwrap());
    assert!(out.contains("**Testing**"));
    assert!(out.contains("- [5] Write tests"));
}

#[test]
fn rules_of_unknown_project_are_not_found() {
    let (_d, _p, store) = demo();
    let err = RuleBook::new(&store, "other").list().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}
