//! Errors returned by the table mutation API.
//!
//! Malformed writes that the replicated-document layer itself never rejects
//! (an unknown tagged-union variant, a structurally wrong payload) are not
//! modeled here: they are silently dropped from the document and
//! surfaced only as a `log::warn!` diagnostic, not as a `Result::Err`.

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TableError {
    /// `upsert` rejected a full row replacement because it does not satisfy
    /// the table's schema. The document is left untouched: validation runs
    /// before any container write.
    #[error("row {key:?} in table {table:?} is not schema-valid")]
    SchemaInvalid { table: String, key: String },
}
