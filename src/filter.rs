//! The filter algebra: small composable predicates over a row's
//! shallow (already-decoded) view, deliberately opaque rather than an
//! inspectable expression tree — a filter is "a function from row to bool",
//! nothing more, so the watcher engine never needs to understand *why* a row
//! matched, only *whether* it still does.

use std::rc::Rc;

use crate::codec::Row;
use crate::value::Value;

pub type Filter = Rc<dyn Fn(&Row) -> bool>;

pub fn any() -> Filter {
    Rc::new(|_row: &Row| true)
}

pub fn eq(field: &str, value: Value) -> Filter {
    let field = field.to_owned();
    Rc::new(move |row: &Row| row.get(&field) == Some(&value))
}

pub fn not(f: Filter) -> Filter {
    Rc::new(move |row: &Row| !f(row))
}

pub fn and(filters: Vec<Filter>) -> Filter {
    Rc::new(move |row: &Row| filters.iter().all(|f| f(row)))
}

pub fn or(filters: Vec<Filter>) -> Filter {
    Rc::new(move |row: &Row| filters.iter().any(|f| f(row)))
}
