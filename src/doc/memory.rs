//! A single-threaded, in-memory [`Doc`] implementation.
//!
//! This is test/example scaffolding, not a production persistence backend —
//! the real replicated document (network transport, CRDT merge, on-disk
//! storage) is an external collaborator this crate never implements. It
//! exists so the rest of the crate, in particular the watcher engine, is
//! independently testable without a real CRDT runtime, the same way the
//! teacher's workspace carries a `spacetimedb-test-datastore` crate behind
//! `test-utils` for exercising `spacetimedb-bindings` without a live host.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{ContainerKind, Disposer, Doc, MapContainer, MapDelta, Path, RawContainer};
use crate::value::Value;

type ListenerId = u64;

/// Capture the set of listener ids registered per path at this instant,
/// detached from the registry itself so a callback that mutates the
/// registry while this snapshot is in use (by registering or disposing a
/// listener) cannot change which ids a firing pass already committed to.
fn snapshot_ids<T>(reg: &RefCell<HashMap<Path, Vec<(ListenerId, T)>>>) -> HashMap<Path, Vec<ListenerId>> {
    reg.borrow()
        .iter()
        .map(|(path, v)| (path.clone(), v.iter().map(|(id, _)| *id).collect()))
        .collect()
}

#[derive(Default)]
struct Inner {
    maps: RefCell<HashMap<Path, BTreeMap<String, Value>>>,
    lists: RefCell<HashMap<Path, Vec<Value>>>,
    texts: RefCell<HashMap<Path, String>>,

    map_shallow: RefCell<HashMap<Path, Vec<(ListenerId, Box<dyn FnMut(&MapDelta)>)>>>,
    shallow: RefCell<HashMap<Path, Vec<(ListenerId, Box<dyn FnMut()>)>>>,
    deep: RefCell<HashMap<Path, Vec<(ListenerId, Box<dyn FnMut()>)>>>,
    next_id: Cell<ListenerId>,

    txn_depth: Cell<u32>,
    txn_deltas: RefCell<HashMap<Path, MapDelta>>,
    txn_touched: RefCell<HashSet<Path>>,
}

/// An in-memory replicated document. Cheap to clone (an `Rc` handle).
#[derive(Clone, Default)]
pub struct MemoryDoc(Rc<Inner>);

impl MemoryDoc {
    pub fn new() -> MemoryDoc {
        MemoryDoc::default()
    }

    fn next_id(&self) -> ListenerId {
        let id = self.0.next_id.get();
        self.0.next_id.set(id + 1);
        id
    }

    /// Runs `f`, opening a transaction if one isn't already open, and
    /// flushing coalesced events only once the outermost call returns.
    fn with_implicit_txn<R>(&self, f: impl FnOnce() -> R) -> R {
        let depth = self.0.txn_depth.get();
        self.0.txn_depth.set(depth + 1);
        let result = f();
        let new_depth = self.0.txn_depth.get() - 1;
        self.0.txn_depth.set(new_depth);
        if new_depth == 0 {
            self.flush();
        }
        result
    }

    fn flush(&self) {
        let deltas = self.0.txn_deltas.take();
        let touched = self.0.txn_touched.take();

        // Snapshot every listener id already registered before this
        // transaction's events start firing. A callback invoked partway
        // through this flush may itself register a brand-new observer (the
        // watcher attaching a just-admitted row's observer right after the
        // table-index event that admitted it, in the same transaction that
        // also wrote the row's fields) — such an observer must never be
        // handed a write that happened earlier in this same transaction,
        // before it existed, so later firing passes only ever consult this
        // frozen snapshot, never the live registries.
        let map_shallow_snapshot = snapshot_ids(&self.0.map_shallow);
        let shallow_snapshot = snapshot_ids(&self.0.shallow);
        let deep_snapshot = snapshot_ids(&self.0.deep);

        for (path, delta) in deltas.iter() {
            if !delta.is_empty() {
                if let Some(ids) = map_shallow_snapshot.get(path) {
                    self.fire_map_shallow(path, delta, ids);
                }
            }
        }
        for path in &touched {
            if let Some(ids) = shallow_snapshot.get(path) {
                self.fire_shallow(path, ids);
            }
        }
        self.fire_deep_for_touched(&touched, &deep_snapshot);
    }

    fn fire_map_shallow(&self, path: &Path, delta: &MapDelta, ids: &[ListenerId]) {
        for &id in ids {
            let entry = {
                let mut reg = self.0.map_shallow.borrow_mut();
                reg.get_mut(path).and_then(|v| {
                    let idx = v.iter().position(|(i, _)| *i == id)?;
                    Some(v.remove(idx))
                })
            };
            if let Some((id, mut cb)) = entry {
                cb(delta);
                self.0
                    .map_shallow
                    .borrow_mut()
                    .entry(path.clone())
                    .or_default()
                    .push((id, cb));
            }
        }
    }

    fn fire_shallow(&self, path: &Path, ids: &[ListenerId]) {
        for &id in ids {
            let entry = {
                let mut reg = self.0.shallow.borrow_mut();
                reg.get_mut(path).and_then(|v| {
                    let idx = v.iter().position(|(i, _)| *i == id)?;
                    Some(v.remove(idx))
                })
            };
            if let Some((id, mut cb)) = entry {
                cb();
                self.0.shallow.borrow_mut().entry(path.clone()).or_default().push((id, cb));
            }
        }
    }

    fn fire_deep_for_touched(&self, touched: &HashSet<Path>, snapshot: &HashMap<Path, Vec<ListenerId>>) {
        for (dp, ids) in snapshot {
            if touched.iter().any(|t| dp.is_prefix_of(t)) {
                self.fire_deep_one(dp, ids);
            }
        }
    }

    fn fire_deep_one(&self, path: &Path, ids: &[ListenerId]) {
        for &id in ids {
            let entry = {
                let mut reg = self.0.deep.borrow_mut();
                reg.get_mut(path).and_then(|v| {
                    let idx = v.iter().position(|(i, _)| *i == id)?;
                    Some(v.remove(idx))
                })
            };
            if let Some((id, mut cb)) = entry {
                cb();
                self.0.deep.borrow_mut().entry(path.clone()).or_default().push((id, cb));
            }
        }
    }
}

impl Doc for MemoryDoc {
    type Map = MapRef;
    type Raw = RawRef;

    fn map(&self, path: &Path) -> MapRef {
        MapRef {
            doc: self.clone(),
            path: path.clone(),
        }
    }

    fn raw(&self, path: &Path, kind: ContainerKind) -> RawRef {
        match kind {
            ContainerKind::Map => RawRef::Map(MapRef {
                doc: self.clone(),
                path: path.clone(),
            }),
            ContainerKind::List => RawRef::List(ListRef {
                doc: self.clone(),
                path: path.clone(),
            }),
            ContainerKind::Text => RawRef::Text(TextRef {
                doc: self.clone(),
                path: path.clone(),
            }),
        }
    }

    fn observe_map_shallow<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut(&MapDelta) + 'static,
    {
        let id = self.next_id();
        self.0
            .map_shallow
            .borrow_mut()
            .entry(path.clone())
            .or_default()
            .push((id, Box::new(callback)));
        let doc = self.clone();
        let path = path.clone();
        Disposer::new(move || {
            if let Some(v) = doc.0.map_shallow.borrow_mut().get_mut(&path) {
                v.retain(|(i, _)| *i != id);
            }
        })
    }

    fn observe_shallow<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut() + 'static,
    {
        let id = self.next_id();
        self.0.shallow.borrow_mut().entry(path.clone()).or_default().push((id, Box::new(callback)));
        let doc = self.clone();
        let path = path.clone();
        Disposer::new(move || {
            if let Some(v) = doc.0.shallow.borrow_mut().get_mut(&path) {
                v.retain(|(i, _)| *i != id);
            }
        })
    }

    fn observe_deep<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut() + 'static,
    {
        let id = self.next_id();
        self.0.deep.borrow_mut().entry(path.clone()).or_default().push((id, Box::new(callback)));
        let doc = self.clone();
        let path = path.clone();
        Disposer::new(move || {
            if let Some(v) = doc.0.deep.borrow_mut().get_mut(&path) {
                v.retain(|(i, _)| *i != id);
            }
        })
    }

    fn transact<F>(&self, f: F)
    where
        F: FnOnce(),
    {
        self.with_implicit_txn(f);
    }
}

/// An ordered-key map container handle: the table index, a row container, a
/// decomposed sub-record, or a raw map container.
#[derive(Clone)]
pub struct MapRef {
    doc: MemoryDoc,
    path: Path,
}

impl MapContainer for MapRef {
    fn get(&self, key: &str) -> Option<Value> {
        self.doc.0.maps.borrow().get(&self.path).and_then(|m| m.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) {
        let path = self.path.clone();
        self.doc.with_implicit_txn(|| {
            let existed = {
                let mut maps = self.doc.0.maps.borrow_mut();
                let map = maps.entry(path.clone()).or_default();
                let existed = map.contains_key(key);
                map.insert(key.to_owned(), value);
                existed
            };
            self.doc.0.txn_touched.borrow_mut().insert(path.clone());
            if !existed {
                self.doc.0.txn_deltas.borrow_mut().entry(path.clone()).or_default().added.push(key.to_owned());
            }
        });
    }

    fn remove(&self, key: &str) -> bool {
        let path = self.path.clone();
        self.doc.with_implicit_txn(|| {
            let removed = {
                let mut maps = self.doc.0.maps.borrow_mut();
                maps.get_mut(&path).map(|m| m.remove(key).is_some()).unwrap_or(false)
            };
            if removed {
                self.doc.0.txn_touched.borrow_mut().insert(path.clone());
                self.doc.0.txn_deltas.borrow_mut().entry(path.clone()).or_default().removed.push(key.to_owned());
            }
            removed
        })
    }

    fn contains(&self, key: &str) -> bool {
        self.doc.0.maps.borrow().get(&self.path).map(|m| m.contains_key(key)).unwrap_or(false)
    }

    fn keys(&self) -> Vec<String> {
        self.doc
            .0
            .maps
            .borrow()
            .get(&self.path)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// A raw list container (e.g. a replicated document's list type).
#[derive(Clone)]
pub struct ListRef {
    doc: MemoryDoc,
    path: Path,
}

impl ListRef {
    pub fn push(&self, value: Value) {
        let path = self.path.clone();
        self.doc.with_implicit_txn(|| {
            self.doc.0.lists.borrow_mut().entry(path.clone()).or_default().push(value);
            self.doc.0.txn_touched.borrow_mut().insert(path);
        });
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.doc.0.lists.borrow().get(&self.path).and_then(|v| v.get(index).cloned())
    }

    pub fn len(&self) -> usize {
        self.doc.0.lists.borrow().get(&self.path).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A raw rich-text fragment container.
#[derive(Clone)]
pub struct TextRef {
    doc: MemoryDoc,
    path: Path,
}

impl TextRef {
    pub fn insert(&self, index: usize, text: &str) {
        let path = self.path.clone();
        self.doc.with_implicit_txn(|| {
            let mut texts = self.doc.0.texts.borrow_mut();
            let s = texts.entry(path.clone()).or_default();
            let idx = s
                .char_indices()
                .nth(index)
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            s.insert_str(idx, text);
            drop(texts);
            self.doc.0.txn_touched.borrow_mut().insert(path);
        });
    }

    pub fn to_string(&self) -> String {
        self.doc.0.texts.borrow().get(&self.path).cloned().unwrap_or_default()
    }
}

/// A handle to any raw shared container.
#[derive(Clone)]
pub enum RawRef {
    Map(MapRef),
    List(ListRef),
    Text(TextRef),
}

impl RawContainer for RawRef {
    fn kind(&self) -> ContainerKind {
        match self {
            RawRef::Map(_) => ContainerKind::Map,
            RawRef::List(_) => ContainerKind::List,
            RawRef::Text(_) => ContainerKind::Text,
        }
    }

    fn as_map(&self) -> Option<&dyn MapContainer> {
        match self {
            RawRef::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl RawRef {
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            RawRef::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&TextRef> {
        match self {
            RawRef::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_map_ref(&self) -> Option<&MapRef> {
        match self {
            RawRef::Map(m) => Some(m),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_set_get_roundtrip() {
        let doc = MemoryDoc::new();
        let m = doc.map(&Path::root("t"));
        assert_eq!(m.get("a"), None);
        m.set("a", Value::Int(1));
        assert_eq!(m.get("a"), Some(Value::Int(1)));
        assert!(m.remove("a"));
        assert_eq!(m.get("a"), None);
        assert!(!m.remove("a"));
    }

    #[test]
    fn map_shallow_coalesces_within_a_transaction() {
        let doc = MemoryDoc::new();
        let path = Path::root("t");
        let m = doc.map(&path);
        let deltas: Rc<RefCell<Vec<MapDelta>>> = Rc::new(RefCell::new(Vec::new()));
        let deltas2 = deltas.clone();
        let _d = doc.observe_map_shallow(&path, move |delta| deltas2.borrow_mut().push(delta.clone()));

        doc.transact(|| {
            m.set("a", Value::Bool(true));
            m.set("b", Value::Bool(true));
            m.remove("a");
        });

        let calls = deltas.borrow();
        assert_eq!(calls.len(), 1, "one coalesced event per transaction, not three");
        assert_eq!(calls[0].added, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(calls[0].removed, vec!["a".to_string()]);
    }

    #[test]
    fn deep_observer_fires_for_descendant_mutation() {
        let doc = MemoryDoc::new();
        let row = Path::root("t").child("k");
        let sub = row.child("nested");
        let count = Rc::new(Cell::new(0));
        let count2 = count.clone();
        let _d = doc.observe_deep(&row, move || count2.set(count2.get() + 1));

        doc.map(&sub).set("x", Value::Int(1));
        assert_eq!(count.get(), 1);

        let shallow_count = Rc::new(Cell::new(0));
        let shallow_count2 = shallow_count.clone();
        let _d2 = doc.observe_shallow(&row, move || shallow_count2.set(shallow_count2.get() + 1));
        doc.map(&sub).set("y", Value::Int(2));
        assert_eq!(shallow_count.get(), 0, "shallow at the row must not fire for a sub-container mutation");
        assert_eq!(count.get(), 2);
    }
}
