//! The replicated-document runtime's required capabilities, expressed as a
//! trait so that a real CRDT runtime (this crate's only external
//! collaborator for storage) can be plugged in. `doc::memory` supplies a
//! single-threaded in-memory implementation used by this crate's own tests
//! and suitable for examples; it is not a persistence backend.

use std::fmt;

use crate::value::Value;

/// A path into the replicated document, e.g. `["users", "alice", "profile"]`
/// for the `profile` sub-container of row `alice` in table `users`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(Vec<String>);

impl Path {
    pub fn root(segment: impl Into<String>) -> Path {
        Path(vec![segment.into()])
    }

    pub fn child(&self, segment: impl Into<String>) -> Path {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Path(segments)
    }

    /// The last path segment, e.g. a row's key or a field's name.
    pub fn last(&self) -> &str {
        self.0.last().expect("a Path always has at least one segment")
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True if `self` is `other`, or a (possibly indirect) parent of `other`.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        self.0.len() <= other.0.len() && self.0 == other.0[..self.0.len()]
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Map,
    List,
    Text,
}

impl From<crate::schema::ContainerKind> for ContainerKind {
    fn from(k: crate::schema::ContainerKind) -> Self {
        match k {
            crate::schema::ContainerKind::Map => ContainerKind::Map,
            crate::schema::ContainerKind::List => ContainerKind::List,
            crate::schema::ContainerKind::Text => ContainerKind::Text,
        }
    }
}

/// An ordered-key map container: `T` (the table index) or `T.K[.F...]` (a
/// row container or a decomposed sub-record).
pub trait MapContainer: Clone {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    /// Returns whether `key` was present.
    fn remove(&self, key: &str) -> bool;
    fn contains(&self, key: &str) -> bool;
    /// Keys in the container's iteration order.
    fn keys(&self) -> Vec<String>;
}

/// A raw shared container: rich-text fragment, list, or an explicitly raw
/// map. Its content is mutated only through this handle's own API, never by
/// the row codec.
pub trait RawContainer: Clone {
    fn kind(&self) -> ContainerKind;
    /// Present only when `kind() == ContainerKind::Map`.
    fn as_map(&self) -> Option<&dyn MapContainer>;
}

/// The added/removed key sets delivered by a shallow observation of a map
/// container: which keys were added, which were removed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl MapDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Detaches an observer. Idempotent: disposing twice is a no-op.
pub struct Disposer(Box<dyn FnMut()>);

impl Disposer {
    pub fn new(f: impl FnMut() + 'static) -> Disposer {
        Disposer(Box::new(f))
    }

    pub fn dispose(&mut self) {
        (self.0)()
    }

    pub fn noop() -> Disposer {
        Disposer(Box::new(|| {}))
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Disposer(..)")
    }
}

/// The replicated document. All methods are synchronous; there is no
/// locking to specify — the whole crate runs under a single
/// cooperatively-scheduled execution context.
pub trait Doc: Clone + 'static {
    type Map: MapContainer;
    type Raw: RawContainer;

    /// Obtain the ordered-key map container at `path`, auto-allocated on
    /// first access.
    fn map(&self, path: &Path) -> Self::Map;

    /// Obtain the raw shared container of `kind` at `path`, auto-allocated
    /// on first access.
    fn raw(&self, path: &Path, kind: ContainerKind) -> Self::Raw;

    /// Fires once per transaction in which keys were added to or removed
    /// from the map container at `path`, with the coalesced delta.
    fn observe_map_shallow<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut(&MapDelta) + 'static;

    /// Fires once per transaction in which `path` itself (not a descendant)
    /// was mutated.
    fn observe_shallow<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut() + 'static;

    /// Fires once per transaction in which `path` or any container beneath
    /// it was mutated.
    fn observe_deep<F>(&self, path: &Path, callback: F) -> Disposer
    where
        F: FnMut() + 'static;

    /// Execute `f` under an atomic transaction boundary; nested calls
    /// coalesce into the outermost transaction's event batch.
    fn transact<F>(&self, f: F)
    where
        F: FnOnce();
}

pub mod memory;
pub use memory::MemoryDoc;
