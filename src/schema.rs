//! The schema model: a closed, tagged-variant tree of node descriptors. A
//! schema is declarative data, not code — dispatch is by tag, never by
//! subclass polymorphism.

use std::collections::BTreeMap;

use crate::value::Value;

/// The container kind a sub-container field is backed by. Mirrors the
/// replicated document's container taxonomy ("ordered-key map
/// container, a list container, a rich-text fragment").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Map,
    List,
    Text,
}

/// One node in a schema tree.
#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    /// `syncAs` — force storage as a sub-container of this kind.
    pub sync_as: Option<ContainerKind>,
    /// `shallow` — opt out of sub-container storage for a record/union node.
    pub shallow: bool,
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    /// A scalar leaf kind delegated to the validator: string, number, boolean, etc.
    Primitive,
    /// An ordered list of named fields.
    Record(Vec<(String, Node)>),
    /// A record whose shape is selected at runtime by the value of one
    /// designated discriminator field.
    TaggedUnion {
        discriminator: String,
        variants: Vec<(String, Node)>,
    },
    /// An opaque raw shared container (rich-text fragment, list, etc.) whose
    /// content is never decomposed by the row codec.
    Raw,
}

impl Node {
    pub fn primitive() -> Node {
        Node {
            kind: NodeKind::Primitive,
            sync_as: None,
            shallow: false,
        }
    }

    pub fn record(fields: Vec<(&str, Node)>) -> Node {
        Node {
            kind: NodeKind::Record(fields.into_iter().map(|(n, v)| (n.to_owned(), v)).collect()),
            sync_as: None,
            shallow: false,
        }
    }

    pub fn tagged_union(discriminator: &str, variants: Vec<(&str, Node)>) -> Node {
        Node {
            kind: NodeKind::TaggedUnion {
                discriminator: discriminator.to_owned(),
                variants: variants.into_iter().map(|(n, v)| (n.to_owned(), v)).collect(),
            },
            sync_as: None,
            shallow: false,
        }
    }

    /// An opaque raw shared container field: rich text, list, or a map used
    /// as a raw (non-decomposed) container rather than a decomposed record.
    pub fn raw(kind: ContainerKind) -> Node {
        Node {
            kind: NodeKind::Raw,
            sync_as: Some(kind),
            shallow: false,
        }
    }

    pub fn sync_as(mut self, kind: ContainerKind) -> Node {
        self.sync_as = Some(kind);
        self
    }

    pub fn shallow(mut self) -> Node {
        self.shallow = true;
        self
    }

    pub fn fields(&self) -> Option<&[(String, Node)]> {
        match &self.kind {
            NodeKind::Record(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Node> {
        self.fields()?.iter().find(|(n, _)| n == name).map(|(_, n)| n)
    }
}

/// How a non-root field is actually stored, per the storage-kind decision
/// "sub-container if `syncAs` names a container kind, *or* the node
/// is a record or a tagged union and `shallow` is not set; inline otherwise."
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageKind {
    Inline,
    /// Sub-container holding a recursively decomposed record or union.
    SubRecord(ContainerKind),
    /// Sub-container holding opaque raw content, never overwritten.
    SubRaw(ContainerKind),
}

pub fn storage_kind(node: &Node) -> StorageKind {
    let is_record_or_union = matches!(node.kind, NodeKind::Record(_) | NodeKind::TaggedUnion { .. });
    match (node.sync_as, &node.kind) {
        (Some(kind), NodeKind::Raw) => StorageKind::SubRaw(kind),
        (Some(kind), _) => StorageKind::SubRecord(kind),
        (None, _) if is_record_or_union && !node.shallow => StorageKind::SubRecord(ContainerKind::Map),
        (None, _) => StorageKind::Inline,
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("missing required field {0:?}")]
    MissingField(String),
    #[error("unknown tagged-union variant {0:?}")]
    UnknownVariant(String),
    #[error("missing discriminator field {0:?}")]
    MissingDiscriminator(String),
    #[error("field {0:?} has the wrong shape for its schema node")]
    WrongShape(String),
}

/// Validate an assembled value against a schema node.
///
/// This is the crate's built-in stand-in for the externally owned
/// schema-validation library: given a node and a candidate value,
/// return the parsed value or an error. Real integrations may replace this
/// with a call into whatever validation crate their row types already derive
/// against; the codec only needs "does this pass, yes or no".
pub fn validate(node: &Node, value: &Value) -> Result<(), SchemaError> {
    match &node.kind {
        NodeKind::Primitive | NodeKind::Raw => Ok(()),
        NodeKind::Record(fields) => {
            let map = value.as_map().ok_or_else(|| SchemaError::WrongShape("<record>".into()))?;
            for (name, field_node) in fields {
                match map.get(name) {
                    Some(v) => validate(field_node, v)?,
                    None => return Err(SchemaError::MissingField(name.clone())),
                }
            }
            Ok(())
        }
        NodeKind::TaggedUnion { discriminator, variants } => {
            let map = value.as_map().ok_or_else(|| SchemaError::WrongShape("<union>".into()))?;
            let tag = map
                .get(discriminator)
                .and_then(Value::as_str)
                .ok_or_else(|| SchemaError::MissingDiscriminator(discriminator.clone()))?;
            let variant_node = variants
                .iter()
                .find(|(name, _)| name == tag)
                .map(|(_, n)| n)
                .ok_or_else(|| SchemaError::UnknownVariant(tag.to_owned()))?;
            validate(variant_node, value)
        }
    }
}

/// The schema for a whole row: always a record whose fields are the table's
/// declared fields, excluding the synthesized `key`.
#[derive(Clone, Debug)]
pub struct RowSchema {
    pub fields: BTreeMap<String, Node>,
    /// Field declaration order, since `BTreeMap` would otherwise reorder
    /// alphabetically; write/read order should follow declaration order for
    /// the sake of readable diffs against a real replicated document.
    pub order: Vec<String>,
}

impl RowSchema {
    pub fn new(fields: Vec<(&str, Node)>) -> RowSchema {
        let order = fields.iter().map(|(n, _)| n.to_string()).collect();
        let fields = fields.into_iter().map(|(n, v)| (n.to_owned(), v)).collect();
        RowSchema { fields, order }
    }

    pub fn as_record_node(&self) -> Node {
        Node {
            kind: NodeKind::Record(self.order.iter().map(|n| (n.clone(), self.fields[n].clone())).collect()),
            sync_as: None,
            shallow: false,
        }
    }
}
