//! End-to-end scenarios (S1-S6) and the crate's testable
//! invariants, run against `doc_tables::MemoryDoc`. Unit-level behavior for a
//! single function lives inline in its module; this file is reserved for
//! checks that span several calls and, in a couple of cases, more than one
//! table.

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use doc_tables::{
    and, any, eq, get_key, or, remove, select, update, upsert, watch, watch_key, ContainerKind, Level, MemoryDoc,
    Node, RowSchema, TableDef, Value,
};

fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

fn people_table() -> TableDef {
    TableDef::new(
        "people",
        RowSchema::new(vec![
            ("foo", Node::primitive()),
            ("bar", Node::primitive()),
        ]),
    )
}

fn row(foo: bool, bar: &str) -> BTreeMap<String, Value> {
    let mut m = BTreeMap::new();
    m.insert("foo".to_string(), Value::Bool(foo));
    m.insert("bar".to_string(), Value::String(bar.into()));
    m
}

/// S1 - simple CRUD.
#[test]
fn s1_simple_crud() {
    let doc = MemoryDoc::new();
    let t = people_table();

    upsert(&doc, &t, "first", row(true, "baz")).unwrap();
    upsert(&doc, &t, "second", row(false, "test")).unwrap();

    let matches = select(&doc, &t, &eq("foo", Value::Bool(true)));
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].key, "first");

    let either = or(vec![eq("foo", Value::Bool(false)), eq("bar", Value::String("baz".into()))]);
    assert_eq!(select(&doc, &t, &either).len(), 2);
}

/// S2 - a no-op update leaves the row unchanged.
#[test]
fn s2_noop_update() {
    let doc = MemoryDoc::new();
    let t = people_table();
    upsert(&doc, &t, "first", row(true, "baz")).unwrap();

    update(&doc, &t, "first", BTreeMap::new());

    let after = get_key(&doc, &t, "first").unwrap();
    assert_eq!(after.get("foo"), Some(&Value::Bool(true)));
    assert_eq!(after.get("bar"), Some(&Value::String("baz".into())));
}

/// S3 - a raw container's content survives across re-reads and is mutated
/// directly, never through the mutation API.
#[test]
fn s3_raw_container_preserved_across_rereads() {
    let doc = MemoryDoc::new();
    let t = TableDef::new("blobs", RowSchema::new(vec![("m", Node::raw(ContainerKind::Map))]));
    upsert(&doc, &t, "r", BTreeMap::new()).unwrap();

    let raw = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    raw.as_map_ref().unwrap().set("k", Value::String("v".into()));

    // A second read sees the same live content, because the raw container is
    // never decomposed into `Row::fields` at all - its handle is obtained
    // directly, same handle both times.
    let raw_again = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    assert_eq!(raw_again.as_map_ref().unwrap().get("k"), Some(Value::String("v".into())));
    assert!(get_key(&doc, &t, "r").is_some(), "the row itself stays valid");
}

/// S4 - a `content`-level watcher sees additions, a content change, a
/// filter-driven removal, and an index-driven removal.
#[test]
fn s4_content_watcher_filter_transition() {
    let doc = MemoryDoc::new();
    let t = people_table();

    let events: std::rc::Rc<std::cell::RefCell<Vec<doc_tables::Notification>>> = Default::default();
    let events2 = events.clone();
    let handle = watch(&doc, t.clone(), eq("foo", Value::Bool(true)), Level::Content, move |n| {
        events2.borrow_mut().push(n.clone())
    });

    upsert(&doc, &t, "first", row(true, "one")).unwrap();
    upsert(&doc, &t, "second", row(false, "two")).unwrap();
    upsert(&doc, &t, "third", row(true, "three")).unwrap();

    let added_keys: Vec<String> = events
        .borrow()
        .iter()
        .flat_map(|n| n.added.iter().map(|r| r.key.clone()))
        .collect();
    assert_eq!(added_keys, vec!["first".to_string(), "third".to_string()]);
    events.borrow_mut().clear();

    let mut patch = BTreeMap::new();
    patch.insert("bar".to_string(), Value::String("updated".into()));
    update(&doc, &t, "first", patch);
    assert_eq!(events.borrow().len(), 1);
    assert_eq!(events.borrow()[0].changed.len(), 1);
    assert_eq!(events.borrow()[0].changed[0].new.get("bar"), Some(&Value::String("updated".into())));
    events.borrow_mut().clear();

    let mut disqualify = BTreeMap::new();
    disqualify.insert("foo".to_string(), Value::Bool(false));
    update(&doc, &t, "third", disqualify);
    assert_eq!(events.borrow().len(), 1);
    assert_eq!(events.borrow()[0].removed.len(), 1);
    assert_eq!(events.borrow()[0].removed[0].key, "third");
    events.borrow_mut().clear();

    remove(&doc, &t, "first");
    assert_eq!(events.borrow().len(), 1);
    assert_eq!(events.borrow()[0].removed.len(), 1);
    assert_eq!(events.borrow()[0].removed[0].key, "first");

    handle.dispose();
}

/// S5 - deep vs. content observation of a raw container field.
#[test]
fn s5_deep_vs_content_on_raw_containers() {
    let doc = MemoryDoc::new();
    let t = TableDef::new(
        "widgets",
        RowSchema::new(vec![
            ("simple", Node::primitive()),
            ("nested", Node::record(vec![("x", Node::primitive())])),
            ("raw_map", Node::raw(ContainerKind::Map)),
        ]),
    );
    let mut nested = BTreeMap::new();
    nested.insert("x".to_string(), Value::Int(1));
    let mut values = BTreeMap::new();
    values.insert("simple".to_string(), Value::Int(1));
    values.insert("nested".to_string(), Value::Map(nested));
    upsert(&doc, &t, "w1", values).unwrap();

    let content_count: std::rc::Rc<std::cell::Cell<u32>> = Default::default();
    let content_count2 = content_count.clone();
    let content_handle = watch(&doc, t.clone(), any(), Level::Content, move |_| {
        content_count2.set(content_count2.get() + 1);
    });
    let deep_count: std::rc::Rc<std::cell::Cell<u32>> = Default::default();
    let deep_count2 = deep_count.clone();
    let deep_handle = watch(&doc, t.clone(), any(), Level::Deep, move |_| {
        deep_count2.set(deep_count2.get() + 1);
    });
    content_count.set(0);
    deep_count.set(0);

    let raw = doc_tables::table::raw_field(&doc, &t, "w1", "raw_map").unwrap();
    raw.as_map_ref().unwrap().set("k", Value::Bool(true));

    assert_eq!(content_count.get(), 0, "content must not react to a raw-container mutation");
    assert_eq!(deep_count.get(), 1, "deep must react to a raw-container mutation");

    content_handle.dispose();
    deep_handle.dispose();
}

/// S6 - a tagged-union field round-trips through upsert/update.
#[test]
fn s6_tagged_union_round_trip() {
    enable_logging();
    let doc = MemoryDoc::new();
    let t = TableDef::new(
        "events",
        RowSchema::new(vec![(
            "variant",
            Node::tagged_union(
                "type",
                vec![
                    ("text", Node::record(vec![("type", Node::primitive()), ("content", Node::primitive())])),
                    ("number", Node::record(vec![("type", Node::primitive()), ("value", Node::primitive())])),
                ],
            ),
        )]),
    );

    let mut text_variant = BTreeMap::new();
    text_variant.insert("type".to_string(), Value::String("text".into()));
    text_variant.insert("content".to_string(), Value::String("hello".into()));
    let mut values = BTreeMap::new();
    values.insert("variant".to_string(), Value::Map(text_variant));
    upsert(&doc, &t, "k1", values).unwrap();

    let row = get_key(&doc, &t, "k1").unwrap();
    let variant = row.get("variant").unwrap().as_map().unwrap();
    assert_eq!(variant.get("type"), Some(&Value::String("text".into())));
    assert_eq!(variant.get("content"), Some(&Value::String("hello".into())));

    let mut number_variant = BTreeMap::new();
    number_variant.insert("type".to_string(), Value::String("number".into()));
    number_variant.insert("value".to_string(), Value::Int(42));
    let mut patch = BTreeMap::new();
    patch.insert("variant".to_string(), Value::Map(number_variant));
    update(&doc, &t, "k1", patch);

    let row = get_key(&doc, &t, "k1").unwrap();
    let variant = row.get("variant").unwrap().as_map().unwrap();
    assert_eq!(variant.get("type"), Some(&Value::String("number".into())));
    assert_eq!(variant.get("value"), Some(&Value::Int(42)));
}

/// Invariant 2 - soft delete hides the row but preserves raw-container fields.
#[test]
fn invariant_soft_delete_hiding_preserves_raw_fields() {
    let doc = MemoryDoc::new();
    let t = TableDef::new("blobs", RowSchema::new(vec![("m", Node::raw(ContainerKind::Map))]));
    upsert(&doc, &t, "r", BTreeMap::new()).unwrap();
    let raw = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    raw.as_map_ref().unwrap().set("k", Value::String("v".into()));

    remove(&doc, &t, "r");
    assert!(get_key(&doc, &t, "r").is_none());
    assert!(select(&doc, &t, &any()).is_empty());

    let raw_after = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    assert_eq!(raw_after.as_map_ref().unwrap().get("k"), Some(Value::String("v".into())));
}

/// Invariant 3 - upsert-after-remove revival preserves raw content but
/// replaces every other field.
#[test]
fn invariant_upsert_after_remove_revival() {
    let doc = MemoryDoc::new();
    let t = TableDef::new(
        "blobs",
        RowSchema::new(vec![("label", Node::primitive()), ("m", Node::raw(ContainerKind::Map))]),
    );
    let mut first = BTreeMap::new();
    first.insert("label".to_string(), Value::String("one".into()));
    upsert(&doc, &t, "r", first).unwrap();
    let raw = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    raw.as_map_ref().unwrap().set("k", Value::String("v".into()));

    remove(&doc, &t, "r");

    let mut second = BTreeMap::new();
    second.insert("label".to_string(), Value::String("two".into()));
    upsert(&doc, &t, "r", second).unwrap();

    let revived = get_key(&doc, &t, "r").unwrap();
    assert_eq!(revived.get("label"), Some(&Value::String("two".into())));
    let raw_after = doc_tables::table::raw_field(&doc, &t, "r", "m").unwrap();
    assert_eq!(raw_after.as_map_ref().unwrap().get("k"), Some(Value::String("v".into())));
}

/// Invariant 5 - filter-join matches set-theoretic `and`/`or` over `select`.
#[test]
fn invariant_filter_join_matches_set_operations() {
    let doc = MemoryDoc::new();
    let t = people_table();
    upsert(&doc, &t, "a", row(true, "x")).unwrap();
    upsert(&doc, &t, "b", row(true, "y")).unwrap();
    upsert(&doc, &t, "c", row(false, "x")).unwrap();

    let f = eq("foo", Value::Bool(true));
    let g = eq("bar", Value::String("x".into()));

    let and_keys: std::collections::BTreeSet<_> = select(&doc, &t, &and(vec![f.clone(), g.clone()])).into_iter().map(|r| r.key).collect();
    let f_keys: std::collections::BTreeSet<_> = select(&doc, &t, &f).into_iter().map(|r| r.key).collect();
    let g_keys: std::collections::BTreeSet<_> = select(&doc, &t, &g).into_iter().map(|r| r.key).collect();
    assert_eq!(and_keys, f_keys.intersection(&g_keys).cloned().collect());

    let or_keys: std::collections::BTreeSet<_> = select(&doc, &t, &or(vec![f.clone(), g.clone()])).into_iter().map(|r| r.key).collect();
    assert_eq!(or_keys, f_keys.union(&g_keys).cloned().collect());
}

/// Invariant 6 - a subscription's seeding call delivers exactly the rows
/// `select` would, as one `added` batch, before any other callback.
#[test]
fn invariant_watcher_seed_matches_select() {
    let doc = MemoryDoc::new();
    let t = people_table();
    upsert(&doc, &t, "a", row(true, "x")).unwrap();
    upsert(&doc, &t, "b", row(false, "y")).unwrap();

    let filter = eq("foo", Value::Bool(true));
    let expected: std::collections::BTreeSet<_> = select(&doc, &t, &filter).into_iter().map(|r| r.key).collect();

    let seen: std::rc::Rc<std::cell::RefCell<Vec<doc_tables::Notification>>> = Default::default();
    let seen2 = seen.clone();
    let handle = watch(&doc, t, filter, Level::Content, move |n| seen2.borrow_mut().push(n.clone()));

    assert_eq!(seen.borrow().len(), 1);
    let seeded: std::collections::BTreeSet<_> = seen.borrow()[0].added.iter().map(|r| r.key.clone()).collect();
    assert_eq!(seeded, expected);
    assert!(seen.borrow()[0].removed.is_empty());
    assert!(seen.borrow()[0].changed.is_empty());
    handle.dispose();
}

/// Invariant 9 - an update that moves a visible row out of the filter emits
/// it as removed, never as changed.
#[test]
fn invariant_transition_out_of_filter_is_removed_not_changed() {
    let doc = MemoryDoc::new();
    let t = people_table();
    upsert(&doc, &t, "a", row(true, "x")).unwrap();

    let seen: std::rc::Rc<std::cell::RefCell<Vec<doc_tables::Notification>>> = Default::default();
    let seen2 = seen.clone();
    let handle = watch(&doc, t.clone(), eq("foo", Value::Bool(true)), Level::Content, move |n| {
        seen2.borrow_mut().push(n.clone())
    });
    seen.borrow_mut().clear();

    let mut patch = BTreeMap::new();
    patch.insert("foo".to_string(), Value::Bool(false));
    update(&doc, &t, "a", patch);

    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].changed.is_empty());
    assert_eq!(seen.borrow()[0].removed.len(), 1);
    handle.dispose();
}

/// A single evaluation of one key can never be
/// classified as both an admission and an eviction in the same batch.
#[test]
fn filter_cannot_both_admit_and_evict_a_key_in_one_pass() {
    let doc = MemoryDoc::new();
    let t = people_table();
    let seen: std::rc::Rc<std::cell::RefCell<Vec<doc_tables::Notification>>> = Default::default();
    let seen2 = seen.clone();
    let handle = watch(&doc, t.clone(), any(), Level::Content, move |n| {
        let added: std::collections::HashSet<_> = n.added.iter().map(|r| &r.key).collect();
        let removed: std::collections::HashSet<_> = n.removed.iter().map(|r| &r.key).collect();
        assert!(added.is_disjoint(&removed), "a single notification never both adds and removes the same key");
        seen2.borrow_mut().push(n.clone());
    });

    upsert(&doc, &t, "a", row(true, "x")).unwrap();
    remove(&doc, &t, "a");
    upsert(&doc, &t, "a", row(true, "y")).unwrap();

    handle.dispose();
}

/// `watch_key`: immediate current value, then appear/disappear.
#[test]
fn watch_key_single_row_lifecycle() {
    let doc = MemoryDoc::new();
    let t = people_table();
    upsert(&doc, &t, "a", row(true, "x")).unwrap();

    let seen: std::rc::Rc<std::cell::RefCell<Vec<Option<doc_tables::Row>>>> = Default::default();
    let seen2 = seen.clone();
    let handle = watch_key(&doc, t.clone(), "a", Level::Content, move |row| seen2.borrow_mut().push(row));
    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].is_some());

    remove(&doc, &t, "a");
    assert_eq!(seen.borrow().len(), 2);
    assert_eq!(seen.borrow()[1], None);

    handle.dispose();
}
