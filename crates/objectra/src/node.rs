//! Typed intermediate tree produced by encoding.
//!
//! A node tree is always acyclic: cycles in the source graph are broken
//! into one declaration node per shared reference plus consumer stubs,
//! with declarations hoisted to their common-ancestor point.

use indexmap::IndexMap;

use crate::registry::TypeTag;
use crate::value::Value;

/// What a node claims to be: a registered type, or an ad hoc named codec.
/// Absent for null/undefined and for consumer stubs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    Type(TypeTag),
    Name(String),
}

/// Primitive leaf payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl Leaf {
    pub fn to_value(&self) -> Value {
        match self {
            Leaf::Null => Value::Null,
            Leaf::Bool(b) => Value::Bool(*b),
            Leaf::Int(i) => Value::Int(*i),
            Leaf::Float(f) => Value::Float(*f),
            Leaf::String(s) => Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Leaf(Leaf),
    List(Vec<Node>),
    Map(IndexMap<String, Node>),
}

/// The intermediate representation of one value.
///
/// Nodes are created only by the encoder or the model deserializer and are
/// immutable afterwards; a node is owned exclusively by the tree holding it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub identifier: Option<Identifier>,
    pub overload: Option<u32>,
    pub content: Option<Content>,
    /// Present only for values detected as shared/circular. Exactly one
    /// node per id in a tree carries content (the declaration).
    pub reference_id: Option<u64>,
    /// Declarations pre-declared at this point, available to consumer
    /// stubs occurring later in the tree.
    pub hoisted: Vec<Node>,
}

impl Node {
    pub fn undefined() -> Node {
        Node::default()
    }

    pub fn null() -> Node {
        Node {
            content: Some(Content::Leaf(Leaf::Null)),
            ..Node::default()
        }
    }

    pub fn leaf(tag: TypeTag, leaf: Leaf) -> Node {
        Node {
            identifier: Some(Identifier::Type(tag)),
            content: Some(Content::Leaf(leaf)),
            ..Node::default()
        }
    }

    pub fn consumer(id: u64) -> Node {
        Node {
            reference_id: Some(id),
            ..Node::default()
        }
    }

    /// Content is a primitive leaf.
    pub fn is_structure_endpoint(&self) -> bool {
        matches!(self.content, Some(Content::Leaf(_)))
    }

    /// Carries real content for its reference id, or is an ordinary
    /// identified node outside any reference bookkeeping.
    pub fn is_declaration(&self) -> bool {
        match self.reference_id {
            Some(_) => self.content.is_some(),
            None => self.identifier.is_some(),
        }
    }

    /// References a declaration by id, carrying no content of its own.
    pub fn is_consumer(&self) -> bool {
        self.reference_id.is_some() && self.content.is_none()
    }
}
