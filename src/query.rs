//! Point lookups and filtered scans over a table.

use crate::codec::{self, Row};
use crate::doc::{Doc, MapContainer};
use crate::filter::Filter;
use crate::table::TableDef;

/// Fetch a single row by key. `None` if the key isn't in the table index, or
/// if its container content doesn't (yet, or any longer) satisfy the schema.
pub fn get_key<D: Doc>(doc: &D, table: &TableDef, key: &str) -> Option<Row> {
    if !doc.map(&table.index_path()).contains(key) {
        return None;
    }
    codec::read_row(doc, &table.index_path(), key, &table.schema)
}

/// Scan every key currently in the table index. For each, the filter is
/// tried against the cheap shallow view first; only matches pay for a full
/// validated read, and a match that turns out partial is skipped rather than
/// surfaced.
pub fn select<D: Doc>(doc: &D, table: &TableDef, filter: &Filter) -> Vec<Row> {
    let index_path = table.index_path();
    doc.map(&index_path)
        .keys()
        .into_iter()
        .filter(|key| {
            let shallow = codec::read_shallow(doc, &table.row_path(key), &table.schema);
            filter(&shallow)
        })
        .filter_map(|key| codec::read_row(doc, &index_path, &key, &table.schema))
        .collect()
}
