use serde_json::json;
use starlog::core::broker::read_audit_log;
use starlog::core::collaborators::{CodeLoader, FileReader};
use starlog::core::expr::Expression;
use starlog::core::resolver::{Resolver, ResolverOptions, placeholders};
use starlog::core::store::DocumentStore;
use starlog::core::template::{self, Template};
use starlog::{ErrorKind, StarlogError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

struct MapFiles(BTreeMap<String, String>);

impl FileReader for MapFiles {
    fn read(&self, path: &str) -> Result<Vec<u8>, StarlogError> {
        self.0
            .get(path)
            .map(|s| s.clone().into_bytes())
            .ok_or_else(|| StarlogError::NotFound(path.to_string()))
    }
}

struct SlowCode;

impl CodeLoader for SlowCode {
    fn get_variable(&self, _module: &str, name: &str) -> Result<String, StarlogError> {
        Ok(format!("value of {name}"))
    }

    fn call(&self, _module: &str, _func: &str) -> Result<String, StarlogError> {
        thread::sleep(Duration::from_millis(500));
        Ok("too late".to_string())
    }
}

fn open_store() -> (tempfile::TempDir, DocumentStore) {
    let tmp = tempdir().unwrap();
    let store = DocumentStore::open(tmp.path(), "tester").unwrap();
    store.create_registry("demo", "notes").unwrap();
    (tmp, store)
}

fn resolver(store: &DocumentStore) -> Resolver<'_> {
    let mut files = BTreeMap::new();
    files.insert("README.md".to_string(), "# Demo".to_string());
    Resolver::new(store, "demo", Arc::new(MapFiles(files)), Arc::new(SlowCode)).with_options(
        ResolverOptions {
            max_depth: 16,
            external_timeout: Duration::from_millis(50),
        },
    )
}

#[test]
fn upsert_is_idempotent_and_keeps_created_at() {
    let (_tmp, store) = open_store();
    let body = json!({"title": "same"});
    let first = store.put("demo", "notes", "n1", &body).unwrap();
    let second = store.put("demo", "notes", "n1", &body).unwrap();

    assert_eq!(store.get_all("demo", "notes").unwrap().len(), 1);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(store.get("demo", "notes", "n1").unwrap().body, body);
}

#[test]
fn get_missing_is_not_found_and_delete_removes() {
    let (_tmp, store) = open_store();
    let err = store.get("demo", "notes", "nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    store.put("demo", "notes", "n1", &json!({"a": 1})).unwrap();
    store.delete("demo", "notes", "n1").unwrap();
    assert_eq!(
        store.get("demo", "notes", "n1").unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(
        store.delete("demo", "notes", "n1").unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn get_all_is_id_ascending() {
    let (_tmp, store) = open_store();
    for id in ["c", "a", "b"] {
        store.put("demo", "notes", id, &json!({"id": id})).unwrap();
    }
    let ids: Vec<_> = store.get_all("demo", "notes").unwrap().into_keys().collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn mutations_are_audited() {
    let (_tmp, store) = open_store();
    store.put("demo", "notes", "n1", &json!({"a": 1})).unwrap();
    let _ = store.delete("demo", "notes", "missing");

    let events = read_audit_log(store.audit_log_path()).unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.op, "document.delete");
    assert_eq!(last.status, "error:not_found");
    assert!(events.iter().any(|e| e.op == "document.put" && e.status == "success"));
    assert!(events.iter().all(|e| e.actor == "tester"));
}

#[test]
fn committed_writes_survive_an_unwritable_audit_log() {
    let (_tmp, store) = open_store();
    std::fs::remove_file(store.audit_log_path()).unwrap();
    std::fs::create_dir(store.audit_log_path()).unwrap();

    let doc = store.put("demo", "notes", "n1", &json!({"a": 1})).unwrap();
    assert_eq!(store.get("demo", "notes", "n1").unwrap(), doc);
}

#[test]
fn nested_refs_resolve_recursively() {
    let (_tmp, store) = open_store();
    store
        .put("demo", "notes", "a", &json!({"summary": {"$ref": "registry_object:notes/b"}}))
        .unwrap();
    store
        .put("demo", "notes", "b", &json!({"detail": {"$ref": "file:README.md"}}))
        .unwrap();

    let e: Expression = "registry_object:notes/a".parse().unwrap();
    assert_eq!(resolver(&store).resolve(&e), "summary: detail: # Demo");
}

#[test]
fn cycles_terminate_with_a_placeholder() {
    let (_tmp, store) = open_store();
    store
        .put("demo", "notes", "a", &json!({"next": {"$ref": "registry_object:notes/b"}}))
        .unwrap();
    store
        .put("demo", "notes", "b", &json!({"next": {"$ref": "registry_object:notes/a"}}))
        .unwrap();

    let e: Expression = "registry_object:notes/a".parse().unwrap();
    let out = resolver(&store).resolve(&e);
    let found = placeholders(&out);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, "cyclic_reference");
    assert_eq!(found[0].reference, "registry_object:notes/a");
}

#[test]
fn self_reference_via_registry_all_is_cyclic() {
    let (_tmp, store) = open_store();
    store
        .put("demo", "notes", "a", &json!({"all": {"$ref": "registry_all:notes"}}))
        .unwrap();
    let e: Expression = "registry_all:notes".parse().unwrap();
    let out = resolver(&store).resolve(&e);
    assert_eq!(placeholders(&out)[0].kind, "cyclic_reference");
}

#[test]
fn diamond_references_are_not_cycles() {
    let (_tmp, store) = open_store();
    store
        .put(
            "demo",
            "notes",
            "top",
            &json!({
                "left": {"$ref": "registry_object:notes/shared"},
                "right": {"$ref": "registry_object:notes/shared"}
            }),
        )
        .unwrap();
    store.put("demo", "notes", "shared", &json!({"v": "x"})).unwrap();

    let e: Expression = "registry_object:notes/top".parse().unwrap();
    let out = resolver(&store).resolve(&e);
    assert!(placeholders(&out).is_empty());
    assert_eq!(out, "left: v: x\nright: v: x");
}

#[test]
fn deep_chains_hit_the_depth_limit() {
    let (_tmp, store) = open_store();
    for i in 0..20 {
        store
            .put(
                "demo",
                "notes",
                &format!("d{i:02}"),
                &json!({"next": {"$ref": format!("registry_object:notes/d{:02}", i + 1)}}),
            )
            .unwrap();
    }
    store.put("demo", "notes", "d20", &json!({"end": "bottom"})).unwrap();

    let e: Expression = "registry_object:notes/d00".parse().unwrap();
    let out = resolver(&store).resolve(&e);
    let found = placeholders(&out);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].kind, "resolution_depth_exceeded");
    assert!(!out.contains("bottom"));

    let shallow: Expression = "registry_object:notes/d15".parse().unwrap();
    assert!(resolver(&store).resolve(&shallow).ends_with("end: bottom"));
}

#[test]
fn slow_delegates_time_out_inline() {
    let (_tmp, store) = open_store();
    let r = resolver(&store);
    let e: Expression = "call:tools#report".parse().unwrap();
    let out = r.resolve(&e);
    assert_eq!(placeholders(&out)[0].kind, "external_dependency_failure");

    let v: Expression = "var:tools#mode".parse().unwrap();
    assert_eq!(r.resolve(&v), "value of mode");
}

#[test]
fn template_renders_blocks_in_order_and_never_writes() {
    let (_tmp, store) = open_store();
    store.put("demo", "notes", "n1", &json!({"text": "stored"})).unwrap();
    let before = read_audit_log(store.audit_log_path()).unwrap().len();

    let t = Template::from_json(
        r#"{"name":"t","blocks":[
            {"type":"static","content":"<Head>{who}</Head>"},
            {"type":"pointer","content":"registry_object:notes/n1"},
            {"type":"pointer","content":"registry_key:notes/n1"},
            {"type":"pointer","content":"registry_object:notes/missing"},
            {"type":"static","content":"</Head>"}
        ]}"#,
    )
    .unwrap();
    let mut vars = BTreeMap::new();
    vars.insert("who".to_string(), "demo".to_string());

    let out = template::render(&t, &resolver(&store), &vars);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], "<Head>demo</Head>");
    assert_eq!(lines[1], "text: stored");
    assert_eq!(lines[2], "@notes/n1");
    assert_eq!(
        lines[3],
        "[[starlog:unresolved kind=not_found ref=registry_object:notes/missing]]"
    );
    assert_eq!(lines[4], "</Head>");
    assert_eq!(read_audit_log(store.audit_log_path()).unwrap().len(), before);
}
