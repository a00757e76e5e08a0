//! Schema-typed, queryable, reactive tables over a replicated document.
//!
//! A table decomposes strongly-typed rows into the containers of an
//! externally-owned CRDT document (`doc::Doc`); the table layer adds a
//! schema, a mutation API (`table::upsert`/`update`/`remove`), point lookups
//! and filtered scans (`query::get_key`/`select`), and a watcher engine
//! (`watch::watch`/`watch_key`) that keeps a live filtered row set correct
//! under concurrent, out-of-order, and partial replication.

pub mod codec;
pub mod doc;
pub mod error;
pub mod filter;
pub mod query;
pub mod schema;
pub mod table;
pub mod value;
pub mod watch;

pub use codec::Row;
pub use doc::{Doc, MemoryDoc};
pub use error::TableError;
pub use filter::{and, any, eq, not, or, Filter};
pub use query::{get_key, select};
pub use schema::{ContainerKind, Node, RowSchema};
pub use table::{remove, update, upsert, TableDef};
pub use value::Value;
pub use watch::{watch, watch_key, Changed, Level, Notification, WatchHandle};
