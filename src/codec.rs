//! The row codec: decomposes a row into container writes, and
//! assembles + validates a row from container reads.

use std::cell::Cell;
use std::collections::BTreeMap;

use crate::doc::{ContainerKind as DocContainerKind, Doc, MapContainer, Path};
use crate::schema::{self, ContainerKind, Node, NodeKind, RowSchema, StorageKind};
use crate::value::Value;

/// A validated row. `key` is always synthesized from the container path and
/// is never present in `fields`.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub key: String,
    pub fields: BTreeMap<String, Value>,
}

impl Row {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

thread_local! {
    /// Counts writes silently dropped because a tagged-union discriminator
    /// didn't match any declared variant. Exposed
    /// so tests can assert the diagnostic fired without needing a capturing
    /// logger.
    static UNKNOWN_VARIANT_WRITES: Cell<u32> = Cell::new(0);
}

pub(crate) fn unknown_variant_write_count() -> u32 {
    UNKNOWN_VARIANT_WRITES.with(|c| c.get())
}

fn to_doc_kind(kind: ContainerKind) -> DocContainerKind {
    kind.into()
}

/// Decompose `values` into container writes under `row_path`, following the
/// schema's declared field order. Fields absent from `values` are left
/// untouched (shallow merge at each level).
pub(crate) fn write_row<D: Doc>(doc: &D, row_path: &Path, schema: &RowSchema, values: &BTreeMap<String, Value>) {
    for name in &schema.order {
        if let Some(value) = values.get(name) {
            write_field(doc, row_path, name, &schema.fields[name], value);
        }
    }
}

fn write_field<D: Doc>(doc: &D, parent_path: &Path, name: &str, node: &Node, value: &Value) {
    match schema::storage_kind(node) {
        StorageKind::Inline => {
            doc.map(parent_path).set(name, value.clone());
        }
        StorageKind::SubRecord(_container_kind) => {
            let sub_path = parent_path.child(name);
            match &node.kind {
                NodeKind::Record(fields) => {
                    let Some(payload) = value.as_map() else {
                        log::warn!("write to record field {sub_path} skipped: payload is not a map");
                        return;
                    };
                    for (fname, fnode) in fields {
                        if let Some(fvalue) = payload.get(fname) {
                            write_field(doc, &sub_path, fname, fnode, fvalue);
                        }
                    }
                }
                NodeKind::TaggedUnion { discriminator, variants } => {
                    let Some(payload) = value.as_map() else {
                        log::warn!("write to union field {sub_path} skipped: payload is not a map");
                        return;
                    };
                    let Some(tag) = payload.get(discriminator).and_then(Value::as_str) else {
                        log::warn!("write to union field {sub_path} skipped: missing discriminator {discriminator:?}");
                        return;
                    };
                    let Some((_, variant_node)) = variants.iter().find(|(vname, _)| vname == tag) else {
                        UNKNOWN_VARIANT_WRITES.with(|c| c.set(c.get() + 1));
                        log::warn!("write to union field {sub_path} dropped: unknown variant {tag:?}");
                        return;
                    };
                    let sub_map = doc.map(&sub_path);
                    sub_map.set(discriminator, Value::String(tag.to_owned()));
                    if let NodeKind::Record(variant_fields) = &variant_node.kind {
                        for (fname, fnode) in variant_fields {
                            if let Some(fvalue) = payload.get(fname) {
                                write_field(doc, &sub_path, fname, fnode, fvalue);
                            }
                        }
                    }
                }
                _ => unreachable!("sub-record storage only applies to record/union nodes"),
            }
        }
        StorageKind::SubRaw(_) => {
            // Raw containers are never overwritten by the mutation API;
            // allocating them on demand is the read path's job.
        }
    }
}

/// Read only the fields stored inline in the row container itself, with no
/// recursion and no schema validation (a pure predicate over the
/// *shallow* row-container view). Always succeeds, even for a row that is
/// still partially replicated or outright invalid; fields backed by a
/// sub-container (record, union, raw) are simply absent, since their values
/// never live as an entry of the row map itself. This is the view filters
/// and the watcher's admission check run against, never the fully assembled
/// row.
pub(crate) fn read_shallow<D: Doc>(doc: &D, row_path: &Path, schema: &RowSchema) -> Row {
    let map = doc.map(row_path);
    let mut fields = BTreeMap::new();
    for name in &schema.order {
        if let Some(v) = map.get(name) {
            fields.insert(name.clone(), v);
        }
    }
    Row {
        key: row_path.last().to_owned(),
        fields,
    }
}

/// Assemble + validate the row at `key` under `table_path`, without
/// consulting the table index. Used by the watcher engine to probe rows
/// that may still be partially replicated.
pub(crate) fn read_row<D: Doc>(doc: &D, table_path: &Path, key: &str, schema: &RowSchema) -> Option<Row> {
    let row_path = table_path.child(key);
    let mut fields = BTreeMap::new();
    for name in &schema.order {
        let node = &schema.fields[name];
        match read_field(doc, &row_path, name, node) {
            Some(v) => {
                fields.insert(name.clone(), v);
            }
            None => return None,
        }
    }
    let whole = Value::Map(fields.clone());
    if schema::validate(&schema.as_record_node(), &whole).is_err() {
        return None;
    }
    Some(Row { key: key.to_owned(), fields })
}

fn read_field<D: Doc>(doc: &D, parent_path: &Path, name: &str, node: &Node) -> Option<Value> {
    match schema::storage_kind(node) {
        StorageKind::Inline => doc.map(parent_path).get(name),
        StorageKind::SubRecord(_) => {
            let sub_path = parent_path.child(name);
            match &node.kind {
                NodeKind::Record(fields) => {
                    let mut out = BTreeMap::new();
                    for (fname, fnode) in fields {
                        match read_field(doc, &sub_path, fname, fnode) {
                            Some(v) => {
                                out.insert(fname.clone(), v);
                            }
                            None => return None,
                        }
                    }
                    Some(Value::Map(out))
                }
                NodeKind::TaggedUnion { discriminator, variants } => {
                    let sub_map = doc.map(&sub_path);
                    let tag = sub_map.get(discriminator).and_then(|v| v.as_str().map(str::to_owned))?;
                    let (_, variant_node) = variants.iter().find(|(vname, _)| vname == &tag)?;
                    let NodeKind::Record(variant_fields) = &variant_node.kind else {
                        return None;
                    };
                    let mut out = BTreeMap::new();
                    out.insert(discriminator.clone(), Value::String(tag));
                    for (fname, fnode) in variant_fields {
                        match read_field(doc, &sub_path, fname, fnode) {
                            Some(v) => {
                                out.insert(fname.clone(), v);
                            }
                            None => return None,
                        }
                    }
                    Some(Value::Map(out))
                }
                _ => None,
            }
        }
        StorageKind::SubRaw(kind) => {
            let sub_path = parent_path.child(name);
            // Auto-allocate on first access; the decoded `Value` carries no
            // content for a raw container (callers reach its live content
            // through `crate::table::raw_field`, not through the row map).
            let _ = doc.raw(&sub_path, to_doc_kind(kind));
            Some(Value::Null)
        }
    }
}
