//! Table declaration and the mutation API: `upsert`, `update`, `remove`.

use std::collections::BTreeMap;

use crate::codec;
use crate::doc::{Doc, MapContainer, Path};
use crate::error::TableError;
use crate::schema::{self, RowSchema, StorageKind};
use crate::value::Value;

/// A table declaration: its name (the table index container's path segment)
/// and its row schema. Cheap to clone; pass by value or share behind an `Rc`
/// as convenient for the caller.
#[derive(Clone, Debug)]
pub struct TableDef {
    pub name: String,
    pub schema: RowSchema,
}

impl TableDef {
    pub fn new(name: &str, schema: RowSchema) -> TableDef {
        TableDef { name: name.to_owned(), schema }
    }

    /// The table index container's path: `T`.
    pub fn index_path(&self) -> Path {
        Path::root(self.name.clone())
    }

    /// A row container's path: `T.K`.
    pub fn row_path(&self, key: &str) -> Path {
        self.index_path().child(key)
    }
}

/// Replace the row at `key` wholesale. Fails synchronously, before touching
/// the document, if `values` does not satisfy the table's schema.
pub fn upsert<D: Doc>(doc: &D, table: &TableDef, key: &str, values: BTreeMap<String, Value>) -> Result<(), TableError> {
    let whole = Value::Map(values.clone());
    if schema::validate(&table.schema.as_record_node(), &whole).is_err() {
        return Err(TableError::SchemaInvalid {
            table: table.name.clone(),
            key: key.to_owned(),
        });
    }
    doc.transact(|| {
        doc.map(&table.index_path()).set(key, Value::Bool(true));
        codec::write_row(doc, &table.row_path(key), &table.schema, &values);
    });
    Ok(())
}

/// Merge `partial` into the row at `key`, without touching the table index.
/// Unlike `upsert`, this never validates: a row may legitimately remain
/// partial (and therefore invisible to readers) across several `update`
/// calls while its fields arrive out of order, and a row that isn't (or is
/// no longer) logically present stays that way — only `upsert` admits a key
/// into the table index.
pub fn update<D: Doc>(doc: &D, table: &TableDef, key: &str, partial: BTreeMap<String, Value>) {
    doc.transact(|| {
        codec::write_row(doc, &table.row_path(key), &table.schema, &partial);
    });
}

/// Remove `key` from the table index. The row's underlying containers are
/// left in place rather than torn down; hard deletion is out of scope.
pub fn remove<D: Doc>(doc: &D, table: &TableDef, key: &str) -> bool {
    doc.transact(|| doc.map(&table.index_path()).remove(key))
}

/// Obtain the live handle for a raw (non-decomposed) field, auto-allocating
/// it if this is the first access. Returns `None` if `field` isn't declared
/// as a raw field on this table's schema.
pub fn raw_field<D: Doc>(doc: &D, table: &TableDef, key: &str, field: &str) -> Option<D::Raw> {
    let node = table.schema.fields.get(field)?;
    let StorageKind::SubRaw(kind) = schema::storage_kind(node) else {
        return None;
    };
    Some(doc.raw(&table.row_path(key).child(field), kind.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::MemoryDoc;
    use crate::schema::Node;

    fn table() -> TableDef {
        TableDef::new(
            "people",
            RowSchema::new(vec![("name", Node::primitive()), ("age", Node::primitive())]),
        )
    }

    #[test]
    fn upsert_rejects_invalid_row_before_writing() {
        let doc = MemoryDoc::new();
        let table = table();
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::String("ada".into()));
        // "age" missing -> schema-invalid.
        let err = upsert(&doc, &table, "p1", values).unwrap_err();
        assert_eq!(
            err,
            TableError::SchemaInvalid {
                table: "people".into(),
                key: "p1".into(),
            }
        );
        assert!(!doc.map(&table.index_path()).contains("p1"));
    }

    #[test]
    fn update_never_admits_a_key_into_the_table_index() {
        let doc = MemoryDoc::new();
        let table = table();

        let mut first = BTreeMap::new();
        first.insert("name".to_string(), Value::String("ada".into()));
        update(&doc, &table, "p1", first);
        assert!(
            !doc.map(&table.index_path()).contains("p1"),
            "update must never touch the table index, even for a key that has never been upserted"
        );

        let mut second = BTreeMap::new();
        second.insert("age".to_string(), Value::Int(36));
        update(&doc, &table, "p1", second);
        assert!(!doc.map(&table.index_path()).contains("p1"));
        assert!(crate::query::get_key(&doc, &table, "p1").is_none(), "the row is fully written but never logically present");

        // Only `upsert`/an external index event admits the key; once that
        // happens, the fields `update` already wrote are picked up as-is.
        doc.map(&table.index_path()).set("p1", Value::Bool(true));
        let row = crate::query::get_key(&doc, &table, "p1").unwrap();
        assert_eq!(row.get("name"), Some(&Value::String("ada".into())));
        assert_eq!(row.get("age"), Some(&Value::Int(36)));
    }

    #[test]
    fn remove_drops_the_key_from_the_index_but_keeps_row_containers() {
        let doc = MemoryDoc::new();
        let table = table();
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::String("ada".into()));
        values.insert("age".to_string(), Value::Int(36));
        upsert(&doc, &table, "p1", values).unwrap();

        assert!(remove(&doc, &table, "p1"));
        assert!(!doc.map(&table.index_path()).contains("p1"));
        // The row's field container is still there, just unindexed.
        assert_eq!(doc.map(&table.row_path("p1")).get("name"), Some(Value::String("ada".into())));
    }

    #[test]
    fn update_after_remove_does_not_revive_the_row() {
        let doc = MemoryDoc::new();
        let table = table();
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::String("ada".into()));
        values.insert("age".to_string(), Value::Int(36));
        upsert(&doc, &table, "p1", values).unwrap();
        remove(&doc, &table, "p1");

        // Even an empty `update` must not re-admit a soft-deleted key: only
        // `upsert` may set the table index.
        update(&doc, &table, "p1", BTreeMap::new());
        assert!(!doc.map(&table.index_path()).contains("p1"));
        assert!(crate::query::get_key(&doc, &table, "p1").is_none());
    }
}
