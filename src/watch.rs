//! The watcher engine — the crate's hard core. Maintains a live filtered
//! "visible row" set under concurrent, out-of-order, partial replication,
//! emitting added/removed/changed notifications.
//!
//! Per-row transitions are accumulated into a batch of transition values
//! first, and the subscriber's callback is invoked exactly once per batch
//! with the full add/remove/change grouping, never once per individual
//! container mutation.
//!
//! Each watched key runs its own tiny state machine (`EntryState`) so that a
//! key which is in the table index but not yet schema-valid (fields still
//! arriving out of order) is tracked without being admitted, and a key the
//! filter currently rejects is simply forgotten — no observer is kept on a
//! row that isn't currently visible, which is what produces the documented
//! "filtered-out row can't become visible again without a table-index event"
//! asymmetry.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::codec::{self, Row};
use crate::doc::{Disposer, Doc, MapContainer, MapDelta};
use crate::filter::Filter;
use crate::table::TableDef;

/// How sensitive a watcher is to in-place content changes of an already
/// visible row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    /// Only admission/eviction via the table index; never emits `changed`.
    Keys,
    /// `changed` fires on direct (shallow) mutation of the row container's
    /// own inline fields. Mutations inside a sub-container or raw container
    /// are invisible at this level.
    Content,
    /// `changed` fires on any mutation anywhere beneath the row container,
    /// including sub-containers and raw shared containers.
    Deep,
}

/// A row that stopped matching or was fully replaced while still visible.
#[derive(Clone, Debug, PartialEq)]
pub struct Changed {
    pub old: Row,
    pub new: Row,
}

/// One batched callback invocation: the three disjoint row groups
/// plus the current full visible set. Never invoked with all three groups
/// empty (empty calls are suppressed), except implicitly — seeding is itself
/// just the first such call, skipped entirely when the initial set is empty.
#[derive(Clone, Debug, PartialEq)]
pub struct Notification {
    pub added: Vec<Row>,
    pub removed: Vec<Row>,
    pub changed: Vec<Changed>,
    /// `key -> validated row` for every row currently visible. Shares
    /// structure (`im::HashMap`) with the snapshot handed to any other
    /// callback invocation in which a given row did not change, so framework
    /// bindings can diff cheaply.
    pub visible: im::HashMap<String, Row>,
}

impl Notification {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// A single row's outcome from one (re-)evaluation. Never more than one of
/// added/removed/changed per key per evaluation — the state machine only
/// ever takes one branch.
enum Transition {
    None,
    Added(Row),
    Removed(Row),
    Changed(Row, Row),
}

enum EntryState {
    /// In the index, filter currently accepts the shallow view, but the full
    /// read is not yet schema-valid. `Disposer` is a deep "retry on any
    /// write" observer, attached regardless of `Level`.
    Pending(Disposer),
    /// Admitted and currently visible. `Disposer` is the level-appropriate
    /// row observer: a no-op for `Keys`, shallow for `Content`, deep for
    /// `Deep` (attached whenever `level != Keys`).
    Visible(Row, Disposer),
}

struct Shared<D: Doc> {
    doc: D,
    table: TableDef,
    filter: Filter,
    level: Level,
    on_event: RefCell<Box<dyn FnMut(&Notification)>>,
    entries: RefCell<HashMap<String, EntryState>>,
    visible: RefCell<im::HashMap<String, Row>>,
}

/// A live subscription. Dropping this without calling `dispose` leaks the
/// registered document observers — callers own teardown explicitly, same as
/// the `Disposer` contract itself.
pub struct WatchHandle<D: Doc> {
    shared: Rc<Shared<D>>,
    index_disposer: Disposer,
}

impl<D: Doc> WatchHandle<D> {
    /// The current visible row set. Cheap to clone and diff against a
    /// previous snapshot: unaffected rows share structure with it (`im`).
    pub fn visible_rows(&self) -> im::HashMap<String, Row> {
        self.shared.visible.borrow().clone()
    }

    /// Detach the table-index observer and every per-row observer. Emits no
    /// events. Safe to call once; dropping the handle without calling this
    /// leaks the underlying document observers.
    pub fn dispose(mut self) {
        self.index_disposer.dispose();
        for (_, entry) in self.shared.entries.borrow_mut().drain() {
            match entry {
                EntryState::Pending(mut d) => d.dispose(),
                EntryState::Visible(_, mut d) => d.dispose(),
            }
        }
    }
}

/// Subscribe to the schema-valid, filter-matching rows of `table`.
///
/// `on_event` is invoked synchronously, at most once per coalesced document
/// transaction per event source (the table-index observer is one source;
/// each admitted row's own observer is a distinct source), and never
/// with an empty notification. By the time it runs, `visible_rows()` already
/// reflects the transition being reported.
pub fn watch<D, F>(doc: &D, table: TableDef, filter: Filter, level: Level, on_event: F) -> WatchHandle<D>
where
    D: Doc,
    F: FnMut(&Notification) + 'static,
{
    let shared = Rc::new(Shared {
        doc: doc.clone(),
        table,
        filter,
        level,
        on_event: RefCell::new(Box::new(on_event)),
        entries: RefCell::new(HashMap::new()),
        visible: RefCell::new(im::HashMap::new()),
    });

    // Seeding: compute the initial visible set as one batch, exactly
    // like `select`, and deliver it as a single `added` call before any
    // other emission of this subscription.
    let seed: Vec<Transition> = doc
        .map(&shared.table.index_path())
        .keys()
        .into_iter()
        .map(|key| admit_or_retry(&shared, &key))
        .collect();
    dispatch(&shared, seed);

    let index_path = shared.table.index_path();
    let shared_for_index = shared.clone();
    let index_disposer = doc.observe_map_shallow(&index_path, move |delta: &MapDelta| {
        let mut batch = Vec::with_capacity(delta.added.len() + delta.removed.len());
        for key in &delta.removed {
            batch.push(evict_key(&shared_for_index, key));
        }
        for key in &delta.added {
            batch.push(admit_or_retry(&shared_for_index, key));
        }
        dispatch(&shared_for_index, batch);
    });

    WatchHandle { shared, index_disposer }
}

/// Subscribe to a single key, regardless of its filter-matching fields
/// Built on `watch` with a filter that only accepts that key; the
/// `row | null` callback contract is reconstructed from the batched
/// notifications `watch` produces.
pub fn watch_key<D, F>(doc: &D, table: TableDef, key: &str, level: Level, on_value: F) -> WatchHandle<D>
where
    D: Doc,
    F: FnMut(Option<Row>) + 'static,
{
    let target = key.to_owned();
    let on_value = Rc::new(RefCell::new(on_value));

    let filter: Filter = {
        let target = target.clone();
        Rc::new(move |row: &Row| row.key == target)
    };

    let target_for_cb = target.clone();
    let on_value_cb = on_value.clone();
    let handle = watch(doc, table, filter, level, move |note: &Notification| {
        for row in &note.added {
            if row.key == target_for_cb {
                (on_value_cb.borrow_mut())(Some(row.clone()));
            }
        }
        for row in &note.removed {
            if row.key == target_for_cb {
                (on_value_cb.borrow_mut())(None);
            }
        }
        for c in &note.changed {
            if c.new.key == target_for_cb {
                (on_value_cb.borrow_mut())(Some(c.new.clone()));
            }
        }
    });

    // "invoked immediately with the current validated value or
    // null" — `watch`'s seeding call above already delivered `Some(row)` if
    // the key was visible at subscribe time; otherwise nothing fired
    // (seeding suppresses empty batches), so we still owe the caller a null.
    if !handle.visible_rows().contains_key(&target) {
        (on_value.borrow_mut())(None);
    }

    handle
}

/// Step 1 of the per-row admission lifecycle: evaluate the filter on the shallow
/// view, then attempt a full validated read. Used both for a key newly
/// appearing in the table index and for a pending key's wait-until-valid
/// retry — both cases re-run the same decision from scratch.
fn admit_or_retry<D: Doc>(shared: &Rc<Shared<D>>, key: &str) -> Transition {
    let shallow = codec::read_shallow(&shared.doc, &shared.table.row_path(key), &shared.table.schema);

    if !(shared.filter)(&shallow) {
        let mut entries = shared.entries.borrow_mut();
        return match entries.remove(key) {
            Some(EntryState::Pending(mut d)) => {
                d.dispose();
                Transition::None
            }
            Some(EntryState::Visible(old, mut d)) => {
                d.dispose();
                Transition::Removed(old)
            }
            None => Transition::None, // never tracked; silently ignored (the known asymmetry)
        };
    }

    {
        // Already visible: nothing to do. (The table index should never
        // re-report a key that's already present, but a defensive no-op
        // keeps this function idempotent.)
        if matches!(shared.entries.borrow().get(key), Some(EntryState::Visible(..))) {
            return Transition::None;
        }
    }

    match codec::read_row(&shared.doc, &shared.table.index_path(), key, &shared.table.schema) {
        Some(row) => {
            let mut entries = shared.entries.borrow_mut();
            if let Some(EntryState::Pending(mut d)) = entries.remove(key) {
                d.dispose();
            }
            drop(entries);
            let disposer = attach_visible_observer(shared, key);
            shared.entries.borrow_mut().insert(key.to_owned(), EntryState::Visible(row.clone(), disposer));
            Transition::Added(row)
        }
        None => {
            let already_pending = matches!(shared.entries.borrow().get(key), Some(EntryState::Pending(_)));
            if !already_pending {
                let disposer = attach_wait_observer(shared, key);
                shared.entries.borrow_mut().insert(key.to_owned(), EntryState::Pending(disposer));
            }
            Transition::None
        }
    }
}

/// Step 2 of the per-row admission lifecycle: re-evaluate an already-visible row
/// when its level-appropriate observer fires.
fn reevaluate_visible<D: Doc>(shared: &Rc<Shared<D>>, key: &str) -> Transition {
    let shallow = codec::read_shallow(&shared.doc, &shared.table.row_path(key), &shared.table.schema);

    if !(shared.filter)(&shallow) {
        let mut entries = shared.entries.borrow_mut();
        return match entries.remove(key) {
            Some(EntryState::Visible(old, mut d)) => {
                d.dispose();
                Transition::Removed(old)
            }
            other => {
                // Shouldn't happen: this function only runs for keys known
                // visible. Put back whatever was there, if anything.
                if let Some(entry) = other {
                    entries.insert(key.to_owned(), entry);
                }
                Transition::None
            }
        };
    }

    match codec::read_row(&shared.doc, &shared.table.index_path(), key, &shared.table.schema) {
        Some(new_row) => {
            let mut entries = shared.entries.borrow_mut();
            let Some(EntryState::Visible(old_row, _)) = entries.get(key) else {
                return Transition::None;
            };
            // `Deep` must report every fire unconditionally: a raw
            // container's own content never shows up in the decoded `Row`
            // at all, so comparing decoded values would silently swallow
            // exactly the mutations `Deep` exists to surface (see the level
            // 7 / S5). `Content`'s observer only ever fires for a direct
            // row-container write, but that write may have re-set a field
            // to the value it already had, so it still needs the equality
            // check to honor the "no-op update emits nothing" rule (S2).
            let changed = match shared.level {
                Level::Keys => false,
                Level::Content => *old_row != new_row,
                Level::Deep => true,
            };
            if !changed {
                return Transition::None;
            }
            let old_row = old_row.clone();
            if let Some(EntryState::Visible(slot, _)) = entries.get_mut(key) {
                *slot = new_row.clone();
            }
            Transition::Changed(old_row, new_row)
        }
        // Transiently invalid again (another partial-replication window);
        // the existing observer stays attached and will retry on its own
        // next fire (do nothing).
        None => Transition::None,
    }
}

fn evict_key<D: Doc>(shared: &Rc<Shared<D>>, key: &str) -> Transition {
    match shared.entries.borrow_mut().remove(key) {
        Some(EntryState::Visible(old, mut d)) => {
            d.dispose();
            Transition::Removed(old)
        }
        Some(EntryState::Pending(mut d)) => {
            d.dispose();
            Transition::None
        }
        None => Transition::None, // was filtered out or never tracked; silent
    }
}

fn attach_wait_observer<D: Doc>(shared: &Rc<Shared<D>>, key: &str) -> Disposer {
    let row_path = shared.table.row_path(key);
    let shared2 = shared.clone();
    let key2 = key.to_owned();
    shared.doc.observe_deep(&row_path, move || {
        let transition = admit_or_retry(&shared2, &key2);
        dispatch(&shared2, vec![transition]);
    })
}

fn attach_visible_observer<D: Doc>(shared: &Rc<Shared<D>>, key: &str) -> Disposer {
    let row_path = shared.table.row_path(key);
    match shared.level {
        Level::Keys => Disposer::noop(),
        Level::Content => {
            let shared2 = shared.clone();
            let key2 = key.to_owned();
            shared.doc.observe_shallow(&row_path, move || {
                let transition = reevaluate_visible(&shared2, &key2);
                dispatch(&shared2, vec![transition]);
            })
        }
        Level::Deep => {
            let shared2 = shared.clone();
            let key2 = key.to_owned();
            shared.doc.observe_deep(&row_path, move || {
                let transition = reevaluate_visible(&shared2, &key2);
                dispatch(&shared2, vec![transition]);
            })
        }
    }
}

/// Fold a batch of per-key transitions into one `Notification`, update the
/// shared visible-set snapshot, and invoke the callback exactly once — or
/// not at all, if nothing in the batch produced a visible change.
fn dispatch<D: Doc>(shared: &Rc<Shared<D>>, transitions: Vec<Transition>) {
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut changed = Vec::new();

    {
        let mut visible = shared.visible.borrow_mut();
        for transition in transitions {
            match transition {
                Transition::None => {}
                Transition::Added(row) => {
                    visible.insert(row.key.clone(), row.clone());
                    added.push(row);
                }
                Transition::Removed(old) => {
                    visible.remove(&old.key);
                    removed.push(old);
                }
                Transition::Changed(old, new) => {
                    visible.insert(new.key.clone(), new.clone());
                    changed.push(Changed { old, new });
                }
            }
        }
    }

    if added.is_empty() && removed.is_empty() && changed.is_empty() {
        return;
    }

    let notification = Notification {
        added,
        removed,
        changed,
        visible: shared.visible.borrow().clone(),
    };
    debug_assert!(!notification.is_empty());
    (shared.on_event.borrow_mut())(&notification);
}
